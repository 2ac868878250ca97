use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use attendly_core::errors::ApplicationError;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::analytics::{AggregationReport, AnalyticsService, QueryOutcome};
use crate::intake::{LeaveIntakeService, LeavePreview};

#[derive(Clone)]
pub struct ApiState {
    intake: LeaveIntakeService,
    analytics: AnalyticsService,
}

impl ApiState {
    pub fn new(intake: LeaveIntakeService, analytics: AnalyticsService) -> Self {
        Self { intake, analytics }
    }
}

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QueryResponse {
    Report { report: AggregationReport },
    NoData { message: String },
    Unanswerable { message: String },
}

impl From<QueryOutcome> for QueryResponse {
    fn from(outcome: QueryOutcome) -> Self {
        match outcome {
            QueryOutcome::Report(report) => Self::Report { report },
            QueryOutcome::NoData(condition) => Self::NoData { message: condition.message() },
            QueryOutcome::Unanswerable(message) => Self::Unanswerable { message },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/leave/parse", post(parse_leave))
        .route("/api/leave/query", post(query_leaves))
        .with_state(state)
}

/// Interpretation and validation of a message; nothing is stored.
pub async fn parse_leave(
    State(state): State<ApiState>,
    Json(request): Json<ParseRequest>,
) -> ApiResult<LeavePreview> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let preview =
        state.intake.preview(message).await.map_err(|error| unavailable("api.leave.parse", error))?;
    Ok(Json(preview))
}

/// Answers a free-text question, or reports last month when none is given.
pub async fn query_leaves(
    State(state): State<ApiState>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<QueryResponse> {
    let question = request.query.as_deref().map(str::trim).filter(|query| !query.is_empty());

    let outcome = match question {
        Some(question) => state.analytics.ask(question).await,
        None => {
            info!(event_name = "api.leave.query.default_period", "no query given; using previous month");
            state.analytics.previous_month().await
        }
    }
    .map_err(|error| unavailable("api.leave.query", error))?;

    Ok(Json(outcome.into()))
}

fn bad_request(message: &str) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message.to_string(), correlation_id: None }))
}

fn unavailable(event_name: &'static str, error: ApplicationError) -> (StatusCode, Json<ApiError>) {
    let correlation_id = Uuid::new_v4().to_string();
    error!(
        event_name,
        correlation_id = %correlation_id,
        error_kind = error.kind(),
        error = %error,
        "api request failed"
    );
    let interface = error.into_interface(correlation_id);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiError {
            error: interface.user_message().to_string(),
            correlation_id: Some(interface.correlation_id().to_string()),
        }),
    )
}
