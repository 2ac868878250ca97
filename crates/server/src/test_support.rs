use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use attendly_agent::{AgentRuntime, CompletionRequest, LlmClient, LlmError};
use attendly_core::clock::{FixedClock, OrgTimeZone};
use attendly_core::config::AppConfig;
use attendly_slack::blocks::MessageTemplate;
use attendly_slack::{SlackWebApi, TransportError};
use chrono::{DateTime, TimeZone, Utc};

/// Answers every completion with the same text.
pub struct CannedLlm {
    reply: Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl CannedLlm {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self { reply: Ok(reply.to_owned()), prompts: Mutex::new(Vec::new()) })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self { reply: Err(message.to_owned()), prompts: Mutex::new(Vec::new()) })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("lock").len()
    }
}

#[async_trait]
impl LlmClient for CannedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        self.prompts.lock().expect("lock").push(request.prompt);
        self.reply.clone().map_err(LlmError::Request)
    }
}

pub fn agent(llm: Arc<CannedLlm>) -> Arc<AgentRuntime> {
    Arc::new(AgentRuntime::new(llm, Duration::from_secs(5)))
}

/// Slack Web API fake: resolves user ids from a fixed directory and records
/// every posted message.
#[derive(Default)]
pub struct FakeSlack {
    users: HashMap<String, String>,
    pub posted: Mutex<Vec<String>>,
}

impl FakeSlack {
    pub fn with_user(user_id: &str, name: &str) -> Self {
        let mut users = HashMap::new();
        users.insert(user_id.to_owned(), name.to_owned());
        Self { users, ..Self::default() }
    }
}

#[async_trait]
impl SlackWebApi for FakeSlack {
    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), TransportError> {
        self.posted.lock().expect("lock").push(format!("{channel_id}:{}", message.fallback_text));
        Ok(())
    }

    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), TransportError> {
        self.posted
            .lock()
            .expect("lock")
            .push(format!("{channel_id}/{user_id}:{}", message.fallback_text));
        Ok(())
    }

    async fn user_name(&self, user_id: &str) -> Result<String, TransportError> {
        self.users.get(user_id).cloned().ok_or_else(|| TransportError::Api {
            method: "users.info",
            error: "user_not_found".to_owned(),
        })
    }

    async fn bot_user_id(&self) -> Result<String, TransportError> {
        Ok("UBOT".to_owned())
    }
}

/// 2024-03-11 10:00 in Asia/Kolkata.
pub fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 11, 4, 30, 0).single().expect("valid instant")
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(monday_morning()))
}

pub fn zone() -> OrgTimeZone {
    AppConfig::default().organization.time_zone()
}

pub fn leave_reply(leave_type: &str, day: &str, start: &str, end: &str) -> String {
    format!(
        r#"{{"is_valid": true, "leave_type": "{leave_type}", "start_time": "{day}T{start}:00+05:30", "end_time": "{day}T{end}:00+05:30", "duration": "9 hours", "reason": "family function"}}"#
    )
}
