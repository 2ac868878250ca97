use attendly_core::config::{AppConfig, LoadOptions};
use attendly_db::{connect_with_settings, migrations};
use serde_json::json;

use crate::commands::CommandResult;

const EXIT_CONFIG: u8 = 2;
const EXIT_RUNTIME: u8 = 3;
const EXIT_DATABASE: u8 = 4;
const EXIT_MIGRATION: u8 = 5;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;

        let pending = migrations::pending(&pool)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(pending)
    });

    match result {
        Ok(applied) => {
            let message = if applied.is_empty() {
                "schema already up to date".to_string()
            } else {
                format!("applied {} pending migration(s)", applied.len())
            };
            let versions: Vec<_> = applied
                .into_iter()
                .map(|(version, description)| json!({ "version": version, "description": description }))
                .collect();
            CommandResult::success_with_detail("migrate", message, Some(json!({ "applied": versions })))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
