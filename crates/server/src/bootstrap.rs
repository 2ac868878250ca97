use std::sync::Arc;

use attendly_agent::{AgentRuntime, LlmError};
use attendly_core::clock::{Clock, SystemClock};
use attendly_core::config::{AppConfig, ConfigError, LoadOptions};
use attendly_core::DeduplicationGuard;
use attendly_db::{connect_with_settings, migrations, DbPool, LeaveRepository, SqlLeaveRepository};
use attendly_slack::{SlackWebApi, SlackWebClient, TransportError};
use thiserror::Error;
use tracing::info;

use crate::analytics::AnalyticsService;
use crate::intake::LeaveIntakeService;

/// Process-wide collaborators, built once and shared by every worker.
pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub agent: Arc<AgentRuntime>,
    pub repository: Arc<dyn LeaveRepository>,
    pub web: Arc<dyn SlackWebApi>,
    pub dedup: Arc<DeduplicationGuard>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("interpretation client setup failed: {0}")]
    Llm(#[source] LlmError),
    #[error("slack client setup failed: {0}")]
    Slack(#[source] TransportError),
}

impl Application {
    pub fn intake_service(&self) -> LeaveIntakeService {
        LeaveIntakeService::new(
            self.agent.clone(),
            self.repository.clone(),
            self.web.clone(),
            self.dedup.clone(),
            self.clock.clone(),
            &self.config.organization,
        )
    }

    pub fn analytics_service(&self) -> AnalyticsService {
        AnalyticsService::new(
            self.agent.clone(),
            self.repository.clone(),
            self.clock.clone(),
            self.config.organization.time_zone(),
        )
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let agent = AgentRuntime::from_config(&config.llm).map_err(BootstrapError::Llm)?;
    let web = SlackWebClient::new(config.slack.bot_token.clone()).map_err(BootstrapError::Slack)?;
    info!(
        event_name = "system.bootstrap.clients_ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        llm_model = %config.llm.model,
        timezone = %config.organization.time_zone().label(),
        "interpretation and slack clients initialized"
    );

    Ok(Application {
        repository: Arc::new(SqlLeaveRepository::new(db_pool.clone())),
        db_pool,
        agent: Arc::new(agent),
        web: Arc::new(web),
        dedup: Arc::new(DeduplicationGuard::new()),
        clock: Arc::new(SystemClock),
        config,
    })
}
