//! Leave interpretation: free text in, [`InterpretedLeave`] out.
//!
//! The service is asked to apply the same calendar rules the validator does, so
//! its own `is_valid: false` verdicts short-circuit before validation. Replies
//! are parsed strictly; nothing missing is ever defaulted.

use std::sync::Arc;
use std::time::Duration;

use attendly_core::clock::{Clock, OrgTimeZone, WorkingHours};
use attendly_core::domain::leave::{CandidateLeave, InterpretedLeave, LeaveType, UnknownLeaveType};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::llm::{complete_within, strip_formatting_noise, CompletionRequest, LlmClient, LlmError};

const LEAVE_SYSTEM_PROMPT: &str =
    "You are a date-aware JSON response bot. Use the current year for all dates. Never use markdown.";
const LEAVE_TEMPERATURE: f32 = 0.1;
const DECLINED_WITHOUT_REASON: &str = "The message could not be understood as a leave request";

#[derive(Debug, Error)]
pub enum InterpretationError {
    #[error(transparent)]
    Service(#[from] LlmError),
    #[error("interpretation reply is not valid JSON ({reason}): {raw}")]
    MalformedReply { reason: String, raw: String },
    #[error("interpretation reply is missing required field `{0}`")]
    MissingField(&'static str),
    #[error(transparent)]
    UnknownLeaveType(#[from] UnknownLeaveType),
    #[error("interpretation reply has an invalid `{field}` timestamp `{value}`")]
    InvalidTimestamp { field: &'static str, value: String },
}

/// Temporal facts handed to the service alongside the message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaveContext {
    pub now: DateTime<FixedOffset>,
    pub sent_at: Option<DateTime<FixedOffset>>,
    pub today: NaiveDate,
    pub tomorrow: NaiveDate,
    pub max_date: NaiveDate,
    pub max_advance_days: u32,
    pub working_hours: WorkingHours,
    pub zone_label: String,
}

impl LeaveContext {
    pub fn build(
        zone: &OrgTimeZone,
        working_hours: WorkingHours,
        max_advance_days: u32,
        clock: &dyn Clock,
        sent_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = zone.now(clock);
        let today = now.date_naive();
        Self {
            now,
            sent_at: sent_at.map(|instant| zone.to_local(instant)),
            today,
            tomorrow: today + chrono::Duration::days(1),
            max_date: today + chrono::Duration::days(i64::from(max_advance_days)),
            max_advance_days,
            working_hours,
            zone_label: zone.label(),
        }
    }

    fn prompt(&self, text: &str) -> String {
        let today = self.today.format("%Y-%m-%d");
        let tomorrow = self.tomorrow.format("%Y-%m-%d");
        let max_date = self.max_date.format("%Y-%m-%d");
        let offset = self.now.offset();
        let work_start = self.working_hours.start.format("%H:%M");
        let work_end = self.working_hours.end.format("%H:%M");
        let sent_at = self
            .sent_at
            .map(|instant| format!("\nMessage sent at: {}", instant.to_rfc3339()))
            .unwrap_or_default();

        format!(
            r#"Parse this message for leave/attendance details. Return a JSON object only.

Message: "{text}"
Current time: {now}{sent_at}

Current context:
- Today's date: {today}
- Tomorrow's date: {tomorrow}
- Maximum allowed date: {max_date}
- Default work hours: {work_start} to {work_end}
- Timezone: {zone}
- Current year: {year}

Rules for leave_type:
- "WFH" for working from home
- "FULL_DAY" for full day leave
- "HALF_DAY" for half day leave
- "LATE_ARRIVAL" for coming late
- "EARLY_DEPARTURE" for leaving early

Important validation rules:
- Leave cannot be requested for past dates
- Leave cannot be requested for dates more than {days} days in advance
- Start time must be before end time
- If validation fails, set is_valid to false and include error message
- Use the {offset} offset for all timestamps
- For "today", use {today}
- For "tomorrow", use {tomorrow}
- For full day leave and WFH: use {work_start} - {work_end}
- For half day leave: use either the first or the second half of the work day

Return a JSON object with these fields:
{{
    "is_valid": true/false,
    "leave_type": "WFH/FULL_DAY/HALF_DAY/LATE_ARRIVAL/EARLY_DEPARTURE",
    "start_time": "{today}T{work_start}:00{offset}",
    "end_time": "{today}T{work_end}:00{offset}",
    "duration": "9 hours",
    "reason": "reason for leave",
    "error": "error message if validation fails"
}}"#,
            now = self.now.to_rfc3339(),
            zone = self.zone_label,
            year = self.today.format("%Y"),
            days = self.max_advance_days,
        )
    }
}

#[derive(Debug, Deserialize)]
struct LeaveReply {
    is_valid: bool,
    #[serde(default)]
    leave_type: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct InterpretationGateway {
    client: Arc<dyn LlmClient>,
    deadline: Duration,
}

impl InterpretationGateway {
    pub fn new(client: Arc<dyn LlmClient>, deadline: Duration) -> Self {
        Self { client, deadline }
    }

    pub async fn interpret(
        &self,
        text: &str,
        context: &LeaveContext,
    ) -> Result<InterpretedLeave, InterpretationError> {
        let request = CompletionRequest {
            system: LEAVE_SYSTEM_PROMPT.to_string(),
            prompt: context.prompt(text),
            temperature: LEAVE_TEMPERATURE,
        };

        let raw = complete_within(self.client.as_ref(), request, self.deadline).await?;
        debug!(event_name = "agent.interpretation.reply", reply = %raw, "leave interpretation reply");

        parse_leave_reply(&raw)
    }
}

pub fn parse_leave_reply(raw: &str) -> Result<InterpretedLeave, InterpretationError> {
    let cleaned = strip_formatting_noise(raw);
    let reply: LeaveReply = serde_json::from_str(cleaned).map_err(|error| {
        InterpretationError::MalformedReply { reason: error.to_string(), raw: raw.to_string() }
    })?;

    if !reply.is_valid {
        let error_message = reply
            .error
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| DECLINED_WITHOUT_REASON.to_string());
        return Ok(InterpretedLeave::Declined { error_message });
    }

    let leave_type: LeaveType = required("leave_type", reply.leave_type)?.parse()?;
    let start_time = timestamp("start_time", required("start_time", reply.start_time)?)?;
    let end_time = timestamp("end_time", required("end_time", reply.end_time)?)?;
    let duration_label = required("duration", reply.duration)?;
    let reason = reply.reason.ok_or(InterpretationError::MissingField("reason"))?;

    Ok(InterpretedLeave::Candidate(CandidateLeave {
        leave_type,
        start_time,
        end_time,
        duration_label,
        reason: reason.trim().to_string(),
    }))
}

fn required(field: &'static str, value: Option<String>) -> Result<String, InterpretationError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(InterpretationError::MissingField(field))
}

fn timestamp(field: &'static str, value: String) -> Result<DateTime<FixedOffset>, InterpretationError> {
    DateTime::parse_from_rfc3339(&value)
        .map_err(|_| InterpretationError::InvalidTimestamp { field, value })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use attendly_core::clock::{parse_utc_offset, FixedClock, OrgTimeZone, WorkingHours};
    use attendly_core::domain::leave::{InterpretedLeave, LeaveType};
    use chrono::{NaiveTime, TimeZone, Utc};

    use super::{parse_leave_reply, InterpretationError, InterpretationGateway, LeaveContext};
    use crate::llm::{CompletionRequest, LlmClient, LlmError};

    struct CannedClient {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            self.seen.lock().expect("lock").push(request);
            Ok(self.reply.clone())
        }
    }

    fn context() -> LeaveContext {
        let zone = OrgTimeZone::new("Asia/Kolkata", parse_utc_offset("+05:30").unwrap());
        let hours = WorkingHours {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        };
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 3, 10, 4, 0, 0).unwrap());
        LeaveContext::build(&zone, hours, 30, &clock, None)
    }

    #[test]
    fn context_computes_today_tomorrow_and_max_date() {
        let context = context();
        assert_eq!(context.today.to_string(), "2024-03-10");
        assert_eq!(context.tomorrow.to_string(), "2024-03-11");
        assert_eq!(context.max_date.to_string(), "2024-04-09");

        let prompt = context.prompt("wfh tomorrow");
        assert!(prompt.contains("Message: \"wfh tomorrow\""));
        assert!(prompt.contains("Maximum allowed date: 2024-04-09"));
        assert!(prompt.contains("Default work hours: 09:00 to 18:00"));
        assert!(prompt.contains("Asia/Kolkata (UTC+05:30)"));
        assert!(prompt.contains("Current year: 2024"));
    }

    #[test]
    fn valid_reply_becomes_candidate() {
        let raw = r#"{"is_valid": true, "leave_type": "FULL_DAY",
            "start_time": "2024-03-11T09:00:00+05:30", "end_time": "2024-03-11T18:00:00+05:30",
            "duration": "9 hours", "reason": "doctor appointment"}"#;

        let InterpretedLeave::Candidate(candidate) = parse_leave_reply(raw).unwrap() else {
            panic!("expected candidate");
        };
        assert_eq!(candidate.leave_type, LeaveType::FullDay);
        assert_eq!(candidate.duration_label, "9 hours");
        assert_eq!(candidate.reason, "doctor appointment");
        assert_eq!(candidate.start_time.to_rfc3339(), "2024-03-11T09:00:00+05:30");
    }

    #[test]
    fn declined_reply_carries_service_message() {
        let raw = r#"{"is_valid": false, "error": "Cannot request leave for past dates"}"#;
        assert_eq!(
            parse_leave_reply(raw).unwrap(),
            InterpretedLeave::Declined {
                error_message: "Cannot request leave for past dates".to_string()
            }
        );

        let bare = parse_leave_reply(r#"{"is_valid": false}"#).unwrap();
        assert!(!bare.is_valid());
    }

    #[test]
    fn missing_leave_type_on_valid_reply_is_a_hard_failure() {
        let raw = r#"{"is_valid": true, "start_time": "2024-03-11T09:00:00+05:30",
            "end_time": "2024-03-11T18:00:00+05:30", "duration": "9 hours", "reason": ""}"#;
        assert!(matches!(
            parse_leave_reply(raw),
            Err(InterpretationError::MissingField("leave_type"))
        ));
    }

    #[test]
    fn unknown_leave_type_is_rejected() {
        let raw = r#"{"is_valid": true, "leave_type": "SABBATICAL",
            "start_time": "2024-03-11T09:00:00+05:30", "end_time": "2024-03-11T18:00:00+05:30",
            "duration": "9 hours", "reason": ""}"#;
        assert!(matches!(parse_leave_reply(raw), Err(InterpretationError::UnknownLeaveType(_))));
    }

    #[test]
    fn absent_reason_is_missing_but_empty_reason_is_allowed() {
        let without = r#"{"is_valid": true, "leave_type": "WFH",
            "start_time": "2024-03-11T09:00:00+05:30", "end_time": "2024-03-11T18:00:00+05:30",
            "duration": "9 hours"}"#;
        assert!(matches!(
            parse_leave_reply(without),
            Err(InterpretationError::MissingField("reason"))
        ));

        let empty = without.replace("\"9 hours\"", "\"9 hours\", \"reason\": \"\"");
        assert!(parse_leave_reply(&empty).unwrap().is_valid());
    }

    #[test]
    fn timestamps_without_offset_are_rejected() {
        let raw = r#"{"is_valid": true, "leave_type": "WFH",
            "start_time": "2024-03-11 09:00", "end_time": "2024-03-11T18:00:00+05:30",
            "duration": "9 hours", "reason": ""}"#;
        assert!(matches!(
            parse_leave_reply(raw),
            Err(InterpretationError::InvalidTimestamp { field: "start_time", .. })
        ));
    }

    #[test]
    fn wrong_field_types_and_garbage_are_malformed() {
        assert!(matches!(
            parse_leave_reply(r#"{"is_valid": "yes"}"#),
            Err(InterpretationError::MalformedReply { .. })
        ));
        assert!(matches!(
            parse_leave_reply("I think they want a day off"),
            Err(InterpretationError::MalformedReply { .. })
        ));
    }

    #[tokio::test]
    async fn gateway_sends_low_temperature_prompt_and_parses_fenced_reply() {
        let client = Arc::new(CannedClient {
            reply: "```json\n{\"is_valid\": true, \"leave_type\": \"LATE_ARRIVAL\", \"start_time\": \"2024-03-11T09:00:00+05:30\", \"end_time\": \"2024-03-11T11:00:00+05:30\", \"duration\": \"2 hours\", \"reason\": \"traffic\"}\n```".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let gateway = InterpretationGateway::new(client.clone(), Duration::from_secs(5));

        let interpreted = gateway.interpret("running 2h late, traffic", &context()).await.unwrap();
        assert!(interpreted.is_valid());

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!((seen[0].temperature - 0.1).abs() < f32::EPSILON);
        assert!(seen[0].prompt.contains("running 2h late, traffic"));
    }
}
