use std::sync::Arc;

use async_trait::async_trait;
use attendly_agent::{AgentRuntime, LeaveContext};
use attendly_core::clock::{Clock, OrgTimeZone, WorkingHours};
use attendly_core::config::OrganizationConfig;
use attendly_core::domain::leave::{InterpretedLeave, LeaveId};
use attendly_core::errors::ApplicationError;
use attendly_core::validation::{LeaveValidator, ValidationOutcome};
use attendly_core::DeduplicationGuard;
use attendly_db::LeaveRepository;
use attendly_slack::blocks::{
    interface_error_notice, leave_confirmation_message, leave_rejection_text, MessageTemplate,
};
use attendly_slack::events::EventHandlerError;
use attendly_slack::{EventContext, LeaveMessageService, MessageEvent, Reply, SlackWebApi};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

/// The interpretation of a message together with the local verdict, without
/// anything being stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeavePreview {
    pub interpretation: InterpretedLeave,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ValidationOutcome>,
}

#[derive(Debug)]
enum IntakeOutcome {
    Recorded { leave_id: LeaveId, confirmation: MessageTemplate },
    Rejected { code: &'static str, reason: String },
}

/// Leave pipeline for channel messages: dedup, interpret, validate, persist,
/// confirm.
#[derive(Clone)]
pub struct LeaveIntakeService {
    agent: Arc<AgentRuntime>,
    repository: Arc<dyn LeaveRepository>,
    web: Arc<dyn SlackWebApi>,
    dedup: Arc<DeduplicationGuard>,
    clock: Arc<dyn Clock>,
    zone: OrgTimeZone,
    working_hours: WorkingHours,
    validator: LeaveValidator,
}

impl LeaveIntakeService {
    pub fn new(
        agent: Arc<AgentRuntime>,
        repository: Arc<dyn LeaveRepository>,
        web: Arc<dyn SlackWebApi>,
        dedup: Arc<DeduplicationGuard>,
        clock: Arc<dyn Clock>,
        organization: &OrganizationConfig,
    ) -> Self {
        let zone = organization.time_zone();
        Self {
            agent,
            repository,
            web,
            dedup,
            clock,
            validator: LeaveValidator::new(zone.clone(), organization.max_advance_days),
            working_hours: organization.working_hours(),
            zone,
        }
    }

    fn context(&self, sent_at: Option<DateTime<Utc>>) -> LeaveContext {
        LeaveContext::build(
            &self.zone,
            self.working_hours,
            self.validator.max_advance_days(),
            self.clock.as_ref(),
            sent_at,
        )
    }

    /// Interprets and validates `text` as if it had been posted right now.
    pub async fn preview(&self, text: &str) -> Result<LeavePreview, ApplicationError> {
        let interpretation = self
            .agent
            .interpreter()
            .interpret(text, &self.context(None))
            .await
            .map_err(|error| ApplicationError::Interpretation(error.to_string()))?;

        let verdict = match &interpretation {
            InterpretedLeave::Candidate(candidate) => {
                Some(self.validator.validate(candidate.clone(), self.clock.as_ref()))
            }
            InterpretedLeave::Declined { .. } => None,
        };
        Ok(LeavePreview { interpretation, verdict })
    }

    async fn record(
        &self,
        event: &MessageEvent,
        user_id: &str,
    ) -> Result<IntakeOutcome, ApplicationError> {
        let username = self
            .web
            .user_name(user_id)
            .await
            .map_err(|error| ApplicationError::Transport(error.to_string()))?;

        let context = self.context(message_instant(&event.ts));
        let interpretation = self
            .agent
            .interpreter()
            .interpret(&event.text, &context)
            .await
            .map_err(|error| ApplicationError::Interpretation(error.to_string()))?;

        let candidate = match interpretation {
            InterpretedLeave::Candidate(candidate) => candidate,
            InterpretedLeave::Declined { error_message } => {
                return Ok(IntakeOutcome::Rejected { code: "declined", reason: error_message });
            }
        };

        let accepted = match self.validator.validate(candidate, self.clock.as_ref()) {
            ValidationOutcome::Accepted(accepted) => accepted,
            ValidationOutcome::Rejected(rejection) => {
                return Ok(IntakeOutcome::Rejected {
                    code: rejection.code(),
                    reason: rejection.reason(),
                });
            }
        };

        let confirmation = leave_confirmation_message(&accepted);
        let leave_id = self
            .repository
            .create(accepted.into_new_leave(username, event.text.clone()))
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        Ok(IntakeOutcome::Recorded { leave_id, confirmation })
    }
}

#[async_trait]
impl LeaveMessageService for LeaveIntakeService {
    async fn handle_leave_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<Reply>, EventHandlerError> {
        let event_id = event.event_id();
        if !self.dedup.observe(&event_id) {
            debug!(
                event_name = "leave.message.duplicate",
                correlation_id = %ctx.correlation_id,
                event_id = %event_id,
                "event already observed; skipping"
            );
            return Ok(None);
        }

        let Some(user_id) = event.user_id.as_deref() else {
            return Ok(None);
        };

        match self.record(event, user_id).await {
            Ok(IntakeOutcome::Recorded { leave_id, confirmation }) => {
                info!(
                    event_name = "leave.recorded",
                    correlation_id = %ctx.correlation_id,
                    event_id = %event_id,
                    leave_id = %leave_id,
                    user_id,
                    "leave recorded"
                );
                Ok(Some(Reply::channel(&event.channel_id, confirmation)))
            }
            Ok(IntakeOutcome::Rejected { code, reason }) => {
                info!(
                    event_name = "leave.rejected",
                    correlation_id = %ctx.correlation_id,
                    event_id = %event_id,
                    user_id,
                    code,
                    reason = %reason,
                    "leave request rejected"
                );
                Ok(Some(Reply::channel(
                    &event.channel_id,
                    MessageTemplate::text(leave_rejection_text(&reason)),
                )))
            }
            Err(application_error) => {
                error!(
                    event_name = "leave.intake.failed",
                    correlation_id = %ctx.correlation_id,
                    event_id = %event_id,
                    channel_id = %event.channel_id,
                    user_id,
                    text = %event.text,
                    error_kind = application_error.kind(),
                    error = %application_error,
                    "leave message could not be processed"
                );
                let notice = application_error.into_interface(ctx.correlation_id.clone());
                Ok(Some(Reply::ephemeral(&event.channel_id, user_id, interface_error_notice(&notice))))
            }
        }
    }
}

/// Slack `ts` values are `<unix seconds>.<microseconds>`.
fn message_instant(ts: &str) -> Option<DateTime<Utc>> {
    let (seconds, fraction) = ts.split_once('.').unwrap_or((ts, "0"));
    let seconds: i64 = seconds.parse().ok()?;
    let micros: u32 = format!("{fraction:0<6}").get(..6)?.parse().ok()?;
    DateTime::from_timestamp(seconds, micros * 1_000)
}
