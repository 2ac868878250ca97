use std::sync::Arc;
use std::time::Duration;

use attendly_core::domain::query::{QueryIntent, QueryType};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::llm::{complete_within, strip_formatting_noise, CompletionRequest, LlmClient, LlmError};

const QUERY_SYSTEM_PROMPT: &str = "You are an AI trained to process attendance queries and return structured JSON. Never return markdown, code blocks, or plain text.";
const QUERY_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error(transparent)]
    Service(#[from] LlmError),
    #[error("query reply is not valid JSON ({reason}): {raw}")]
    MalformedReply { reason: String, raw: String },
    #[error("query reply is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unknown query type `{0}`")]
    UnknownQueryType(String),
    #[error("query reply has an invalid `{field}` date `{value}` (expected YYYY-MM-DD)")]
    InvalidDate { field: &'static str, value: String },
    #[error("query range starts on {start} after it ends on {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
    #[error("{}", unresolvable_message(.message, .suggestion.as_deref()))]
    Unresolvable { message: String, suggestion: Option<String> },
}

impl ClassifierError {
    /// Text safe to show the person who asked. `None` means a generic failure
    /// notice should be shown instead.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Unresolvable { message, suggestion } => {
                Some(unresolvable_message(message, suggestion.as_deref()))
            }
            Self::UnknownQueryType(_) => Some(
                "I can report the employee with the most leaves, stats for a period, or stats for one employee.".to_string(),
            ),
            Self::InvertedRange { start, end } => Some(format!(
                "The period starts on {} after it ends on {}.",
                start.format("%b %-d, %Y"),
                end.format("%b %-d, %Y")
            )),
            Self::Service(_)
            | Self::MalformedReply { .. }
            | Self::MissingField(_)
            | Self::InvalidDate { .. } => None,
        }
    }
}

fn unresolvable_message(message: &str, suggestion: Option<&str>) -> String {
    match suggestion {
        Some(suggestion) => format!("{message}. Suggested fix: {suggestion}"),
        None => message.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct QueryReply {
    #[serde(default)]
    query_type: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
}

pub struct QueryClassifier {
    client: Arc<dyn LlmClient>,
    deadline: Duration,
}

impl QueryClassifier {
    pub fn new(client: Arc<dyn LlmClient>, deadline: Duration) -> Self {
        Self { client, deadline }
    }

    pub async fn classify(
        &self,
        question: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<QueryIntent, ClassifierError> {
        let request = CompletionRequest {
            system: QUERY_SYSTEM_PROMPT.to_string(),
            prompt: query_prompt(question, now),
            temperature: QUERY_TEMPERATURE,
        };

        let raw = complete_within(self.client.as_ref(), request, self.deadline).await?;
        debug!(event_name = "agent.classifier.reply", reply = %raw, "query classification reply");

        parse_query_reply(&raw)
    }
}

fn query_prompt(question: &str, now: DateTime<FixedOffset>) -> String {
    format!(
        r#"Analyze this leave/attendance query and return a structured JSON response.

Query: "{question}"
Current time: {now}

Supported query types:
- "top_employee": the employee with the most leave records overall
- "period_stats": leave statistics per employee between start_date and end_date (inclusive)
- "employee_stats": leave statistics for one employee given by username

Important rules:
1. Always return valid JSON with all required fields.
2. Detect and correct misspellings in queries where possible.
3. Resolve relative periods ("this month", "last week") to concrete YYYY-MM-DD dates.
4. If the query is invalid or ambiguous, set "error" and put a valid rephrasing in "suggestion".
5. Never include markdown, bullet points, or extra text, only return structured JSON.

JSON output format:
{{
    "query_type": "top_employee" | "period_stats" | "employee_stats",
    "start_date": "YYYY-MM-DD" (required for period_stats),
    "end_date": "YYYY-MM-DD" (required for period_stats),
    "username": "slack handle" (required for employee_stats),
    "error": optional,
    "suggestion": optional
}}"#,
        now = now.to_rfc3339(),
    )
}

pub fn parse_query_reply(raw: &str) -> Result<QueryIntent, ClassifierError> {
    let cleaned = strip_formatting_noise(raw);
    let reply: QueryReply = serde_json::from_str(cleaned).map_err(|error| {
        ClassifierError::MalformedReply { reason: error.to_string(), raw: raw.to_string() }
    })?;

    if let Some(message) = non_empty(reply.error) {
        return Err(ClassifierError::Unresolvable {
            message,
            suggestion: non_empty(reply.suggestion),
        });
    }

    let query_type =
        non_empty(reply.query_type).ok_or(ClassifierError::MissingField("query_type"))?;
    let query_type =
        QueryType::parse(&query_type).ok_or(ClassifierError::UnknownQueryType(query_type))?;

    match query_type {
        QueryType::TopEmployee => Ok(QueryIntent::TopEmployee),
        QueryType::PeriodStats => {
            let start_date = date("start_date", reply.start_date)?;
            let end_date = date("end_date", reply.end_date)?;
            if start_date > end_date {
                return Err(ClassifierError::InvertedRange { start: start_date, end: end_date });
            }
            Ok(QueryIntent::PeriodStats { start_date, end_date })
        }
        QueryType::EmployeeStats => {
            let username = non_empty(reply.username)
                .ok_or(ClassifierError::MissingField("username"))?;
            Ok(QueryIntent::EmployeeStats {
                username: username.trim_start_matches('@').to_string(),
            })
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn date(field: &'static str, value: Option<String>) -> Result<NaiveDate, ClassifierError> {
    let value = non_empty(value).ok_or(ClassifierError::MissingField(field))?;
    NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .map_err(|_| ClassifierError::InvalidDate { field, value })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use attendly_core::domain::query::QueryIntent;
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    use super::{parse_query_reply, ClassifierError, QueryClassifier};
    use crate::llm::{CompletionRequest, LlmClient, LlmError};

    struct CannedClient {
        reply: String,
        temperatures: Mutex<Vec<f32>>,
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            self.temperatures.lock().expect("lock").push(request.temperature);
            Ok(self.reply.clone())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_stats_reply_becomes_inclusive_range() {
        let intent = parse_query_reply(
            r#"{"query_type": "period_stats", "start_date": "2024-03-01", "end_date": "2024-03-31"}"#,
        )
        .unwrap();
        assert_eq!(
            intent,
            QueryIntent::PeriodStats { start_date: date(2024, 3, 1), end_date: date(2024, 3, 31) }
        );
    }

    #[test]
    fn fenced_reply_with_extra_fields_is_accepted() {
        let raw = "```json\n{\"query_type\": \"top_employee\", \"analysis_subtype\": \"most_leaves\", \"metrics\": {\"count\": \"1\"}}\n```";
        assert_eq!(parse_query_reply(raw).unwrap(), QueryIntent::TopEmployee);
    }

    #[test]
    fn employee_stats_requires_username_and_strips_mention_sigil() {
        assert_eq!(
            parse_query_reply(r#"{"query_type": "employee_stats", "username": "@ravi"}"#).unwrap(),
            QueryIntent::EmployeeStats { username: "ravi".to_string() }
        );
        assert!(matches!(
            parse_query_reply(r#"{"query_type": "employee_stats", "username": "  "}"#),
            Err(ClassifierError::MissingField("username"))
        ));
    }

    #[test]
    fn error_with_suggestion_is_unresolvable() {
        let error = parse_query_reply(
            r#"{"query_type": "period_stats", "error": "Invalid query", "suggestion": "Ask about a past month"}"#,
        )
        .unwrap_err();

        assert_eq!(error.to_string(), "Invalid query. Suggested fix: Ask about a past month");
        assert_eq!(
            error.user_message().as_deref(),
            Some("Invalid query. Suggested fix: Ask about a past month")
        );
    }

    #[test]
    fn unknown_query_type_fails_loudly() {
        assert!(matches!(
            parse_query_reply(r#"{"query_type": "department_trends"}"#),
            Err(ClassifierError::UnknownQueryType(ref name)) if name == "department_trends"
        ));
    }

    #[test]
    fn period_dates_must_be_present_well_formed_and_ordered() {
        assert!(matches!(
            parse_query_reply(r#"{"query_type": "period_stats", "end_date": "2024-03-31"}"#),
            Err(ClassifierError::MissingField("start_date"))
        ));
        assert!(matches!(
            parse_query_reply(r#"{"query_type": "period_stats", "start_date": "03/01/2024", "end_date": "2024-03-31"}"#),
            Err(ClassifierError::InvalidDate { field: "start_date", .. })
        ));
        assert!(matches!(
            parse_query_reply(r#"{"query_type": "period_stats", "start_date": "2024-04-01", "end_date": "2024-03-31"}"#),
            Err(ClassifierError::InvertedRange { .. })
        ));
    }

    #[test]
    fn internal_failures_have_no_user_message() {
        let error = parse_query_reply("not json").unwrap_err();
        assert!(matches!(error, ClassifierError::MalformedReply { .. }));
        assert!(error.user_message().is_none());
    }

    #[tokio::test]
    async fn classifier_uses_query_temperature() {
        let client = Arc::new(CannedClient {
            reply: r#"{"query_type": "top_employee"}"#.to_string(),
            temperatures: Mutex::new(Vec::new()),
        });
        let classifier = QueryClassifier::new(client.clone(), Duration::from_secs(5));
        let now = FixedOffset::east_opt(19_800)
            .unwrap()
            .with_ymd_and_hms(2024, 4, 2, 10, 0, 0)
            .unwrap();

        let intent = classifier.classify("who took the most leave?", now).await.unwrap();
        assert_eq!(intent, QueryIntent::TopEmployee);
        assert_eq!(client.temperatures.lock().unwrap().as_slice(), &[0.3]);
    }
}
