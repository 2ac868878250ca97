mod analytics;
mod api;
mod bootstrap;
mod health;
mod ingress;
mod intake;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use attendly_core::config::{AppConfig, LoadOptions};
use attendly_slack::runner::DEFAULT_QUEUE_CAPACITY;
use attendly_slack::signature::SignatureVerifier;
use attendly_slack::{
    ingress_queue, ChannelMessageHandler, EventDispatcher, IngressRunner, SlashCommandHandler,
};
use tracing::{error, info, warn};

use crate::api::ApiState;
use crate::health::HealthState;
use crate::ingress::IngressState;

fn init_logging(config: &AppConfig) {
    use attendly_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let bot_user_id = match app.web.bot_user_id().await {
        Ok(user_id) => Some(user_id),
        Err(error) => {
            warn!(
                event_name = "system.server.bot_identity_unknown",
                correlation_id = "bootstrap",
                error = %error,
                "auth.test failed; the bot's own messages are filtered by bot_id only"
            );
            None
        }
    };

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ChannelMessageHandler::new(app.intake_service()));
    dispatcher.register(SlashCommandHandler::new(
        app.analytics_service(),
        app.config.slack.query_command.clone(),
    ));

    let (sender, transport) = ingress_queue(DEFAULT_QUEUE_CAPACITY);
    let runner = IngressRunner::new(
        Arc::new(transport),
        dispatcher,
        app.web.clone(),
        Duration::from_secs(app.config.server.worker_timeout_secs),
    )
    .with_bot_user_id(bot_user_id);
    let runner_task = tokio::spawn(async move { runner.run().await });

    let health_state =
        HealthState::new(app.db_pool.clone(), app.dedup.clone(), app.clock.clone());
    let router = health::router(health_state)
        .merge(ingress::router(IngressState::new(
            SignatureVerifier::new(app.config.slack.signing_secret.clone()),
            sender,
            app.clock.clone(),
        )))
        .merge(api::router(ApiState::new(app.intake_service(), app.analytics_service())));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        query_command = %app.config.slack.query_command,
        "attendly-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "http surface closed; draining event workers"
    );

    // The router held the last ingress sender, so the runner sees the queue close.
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, runner_task).await {
        Ok(Ok(Ok(summary))) => info!(
            event_name = "system.server.stopped",
            correlation_id = "shutdown",
            received = summary.received,
            replied = summary.replied,
            failed = summary.failed,
            timed_out = summary.timed_out,
            "attendly-server stopped"
        ),
        Ok(Ok(Err(ingress_error))) => {
            error!(event_name = "system.server.runner_failed", error = %ingress_error, "ingress runner failed")
        }
        Ok(Err(join_error)) => {
            error!(event_name = "system.server.runner_failed", error = %join_error, "ingress runner panicked")
        }
        Err(_) => warn!(
            event_name = "system.server.drain_timeout",
            grace_secs = grace.as_secs(),
            "in-flight workers abandoned at shutdown"
        ),
    }

    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(event_name = "system.server.signal_failed", error = %error, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
