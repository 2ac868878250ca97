use std::sync::Arc;

use attendly_core::clock::Clock;
use attendly_core::DeduplicationGuard;
use attendly_db::{connection::ping, migrations, DbPool};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

/// Readiness of the leave pipeline: the store must answer and carry every
/// shipped migration before leaves can be recorded.
#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    dedup: Arc<DeduplicationGuard>,
    clock: Arc<dyn Clock>,
}

impl HealthState {
    pub fn new(db_pool: DbPool, dedup: Arc<DeduplicationGuard>, clock: Arc<dyn Clock>) -> Self {
        Self { db_pool, dedup, clock }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Debug, Serialize)]
pub struct LeaveStoreStatus {
    pub reachable: bool,
    pub pending_migrations: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: Readiness,
    pub leave_store: LeaveStoreStatus,
    pub events_observed: usize,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let leave_store = leave_store_status(&state.db_pool).await;
    let ready = leave_store.reachable && leave_store.pending_migrations.is_empty();

    let report = HealthReport {
        status: if ready { Readiness::Ready } else { Readiness::Degraded },
        leave_store,
        events_observed: state.dedup.len(),
        checked_at: state.clock.now_utc().to_rfc3339(),
    };
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(report))
}

async fn leave_store_status(pool: &DbPool) -> LeaveStoreStatus {
    let probe = async {
        ping(pool).await?;
        migrations::pending(pool).await
    };

    match probe.await {
        Ok(pending) => LeaveStoreStatus {
            reachable: true,
            pending_migrations: pending.into_iter().map(|(version, _)| version).collect(),
            error: None,
        },
        Err(error) => LeaveStoreStatus {
            reachable: false,
            pending_migrations: Vec::new(),
            error: Some(error.to_string()),
        },
    }
}
