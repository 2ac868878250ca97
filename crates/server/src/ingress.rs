use std::sync::Arc;

use attendly_core::clock::Clock;
use attendly_slack::payload::{parse_events_api, parse_slash_command, EventsApiRequest};
use attendly_slack::runner::IngressError;
use attendly_slack::signature::{SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use attendly_slack::{IngressSender, SlackEnvelope};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::{info, warn};

/// Slack's HTTP entry points. Requests are verified, acknowledged and queued;
/// the work happens in the ingress runner.
#[derive(Clone)]
pub struct IngressState {
    verifier: SignatureVerifier,
    sender: IngressSender,
    clock: Arc<dyn Clock>,
}

impl IngressState {
    pub fn new(verifier: SignatureVerifier, sender: IngressSender, clock: Arc<dyn Clock>) -> Self {
        Self { verifier, sender, clock }
    }

    fn verify(
        &self,
        endpoint: &'static str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(), StatusCode> {
        let timestamp = header(headers, TIMESTAMP_HEADER);
        let signature = header(headers, SIGNATURE_HEADER);
        self.verifier
            .verify(timestamp, signature, body, self.clock.now_utc())
            .map_err(|error| {
                warn!(
                    event_name = "ingress.slack.signature_rejected",
                    endpoint,
                    error = %error,
                    "rejecting unsigned or stale slack request"
                );
                StatusCode::UNAUTHORIZED
            })
    }

    fn enqueue(&self, envelope: SlackEnvelope) -> StatusCode {
        let envelope_id = envelope.envelope_id.clone();
        match self.sender.enqueue(envelope) {
            Ok(()) => StatusCode::OK,
            Err(error) => {
                warn!(
                    event_name = "ingress.slack.enqueue_failed",
                    correlation_id = %envelope_id,
                    error = %error,
                    "could not queue slack envelope"
                );
                match error {
                    IngressError::QueueFull | IngressError::QueueClosed => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    IngressError::Receive(_) => StatusCode::INTERNAL_SERVER_ERROR,
                }
            }
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub fn router(state: IngressState) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/slack/commands", post(slack_commands))
        .with_state(state)
}

pub async fn slack_events(
    State(state): State<IngressState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(status) = state.verify("events", &headers, &body) {
        return status.into_response();
    }

    match parse_events_api(&body) {
        Ok(EventsApiRequest::UrlVerification { challenge }) => {
            info!(event_name = "ingress.slack.url_verification", "answering url verification");
            Json(json!({ "challenge": challenge })).into_response()
        }
        Ok(EventsApiRequest::Callback(envelope)) => state.enqueue(envelope).into_response(),
        Ok(EventsApiRequest::Ignored) => StatusCode::OK.into_response(),
        Err(error) => {
            warn!(event_name = "ingress.slack.bad_payload", error = %error, "unreadable events api body");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

pub async fn slack_commands(
    State(state): State<IngressState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(status) = state.verify("commands", &headers, &body) {
        return status.into_response();
    }

    match parse_slash_command(&body) {
        Ok(envelope) => state.enqueue(envelope).into_response(),
        Err(error) => {
            warn!(event_name = "ingress.slack.bad_payload", error = %error, "unreadable slash command body");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}
