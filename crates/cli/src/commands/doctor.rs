use attendly_core::config::{AppConfig, LlmProvider, LoadOptions};
use attendly_db::{connect_with_settings, connection::ping, migrations};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::config::redact_token;
use crate::commands::CommandResult;

const EXIT_NOT_READY: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_NOT_READY };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck::pass("config_validation", "configuration loaded and validated"),
            check_slack_credentials(&config),
            check_llm_settings(&config),
            check_database(&config),
        ],
        Err(error) => vec![
            DoctorCheck::fail("config_validation", error.to_string()),
            DoctorCheck::skipped("slack_credentials"),
            DoctorCheck::skipped("llm_settings"),
            DoctorCheck::skipped("database_connectivity"),
        ],
    };

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_slack_credentials(config: &AppConfig) -> DoctorCheck {
    if config.slack.signing_secret.expose_secret().trim().is_empty() {
        return DoctorCheck::fail("slack_credentials", "signing secret is empty");
    }

    DoctorCheck::pass(
        "slack_credentials",
        format!(
            "bot token {} and signing secret present; queries answer on {}",
            redact_token(config.slack.bot_token.expose_secret()),
            config.slack.query_command
        ),
    )
}

fn check_llm_settings(config: &AppConfig) -> DoctorCheck {
    let llm = &config.llm;
    match llm.provider {
        LlmProvider::OpenAi if llm.api_key.is_none() => {
            DoctorCheck::fail("llm_settings", "openai provider selected without an api key")
        }
        LlmProvider::Ollama if llm.base_url.is_none() => {
            DoctorCheck::fail("llm_settings", "ollama provider selected without a base url")
        }
        provider => DoctorCheck::pass(
            "llm_settings",
            format!("{provider:?} model `{}` with {}s timeout", llm.model, llm.timeout_secs),
        ),
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(
                "database_connectivity",
                format!("failed to initialize async runtime: {error}"),
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
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let outcome = async {
            ping(&pool).await.map_err(|error| format!("database query failed: {error}"))?;
            migrations::pending(&pool)
                .await
                .map_err(|error| format!("could not read migration history: {error}"))
        }
        .await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(pending) if pending.is_empty() => DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`; schema up to date", config.database.url),
        ),
        Ok(pending) => DoctorCheck::pass(
            "database_connectivity",
            format!(
                "connected using `{}`; {} migration(s) pending, run `attendly migrate` or start the server",
                config.database.url,
                pending.len()
            ),
        ),
        Err(error) => DoctorCheck::fail("database_connectivity", error),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
