use async_trait::async_trait;
use thiserror::Error;

use crate::blocks::{MessageBuilder, MessageTemplate};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
    pub request_id: String,
}

/// A `/query` invocation reduced to what the analytics pipeline needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryCommand {
    pub question: String,
    pub channel_id: String,
    pub user_id: String,
    pub request_id: String,
}

/// Where a command answer goes: reports are shared with the channel, errors
/// only with the person who asked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandReply {
    Report(MessageTemplate),
    Private(MessageTemplate),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

pub fn normalize_query_command(
    payload: SlashCommandPayload,
    expected_command: &str,
) -> Result<QueryCommand, CommandParseError> {
    if !payload.command.trim().eq_ignore_ascii_case(expected_command) {
        return Err(CommandParseError::UnsupportedCommand(payload.command));
    }

    Ok(QueryCommand {
        question: payload.text.trim().to_owned(),
        channel_id: payload.channel_id,
        user_id: payload.user_id,
        request_id: payload.request_id,
    })
}

pub fn query_help_message(command_name: &str) -> MessageTemplate {
    MessageBuilder::new("Leave query help")
        .section("query.help.summary.v1", |section| {
            section.mrkdwn(format!(
                "*Ask me about leave*\n• `{command_name} who took the most leave?`\n• `{command_name} leave stats for March 2024`\n• `{command_name} how many leaves has @ravi taken?`"
            ));
        })
        .build()
}

pub struct CommandRouter<S> {
    service: S,
    command_name: String,
}

impl<S> CommandRouter<S>
where
    S: AnalyticsCommandService,
{
    pub fn new(service: S, command_name: impl Into<String>) -> Self {
        Self { service, command_name: command_name.into() }
    }

    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    pub async fn route(&self, command: QueryCommand) -> Result<CommandReply, CommandRouteError> {
        let lowered = command.question.to_ascii_lowercase();
        if lowered.is_empty() || lowered == "help" {
            return Ok(CommandReply::Private(query_help_message(&self.command_name)));
        }

        self.service.answer(&command).await
    }
}

#[async_trait]
pub trait AnalyticsCommandService: Send + Sync {
    async fn answer(&self, command: &QueryCommand) -> Result<CommandReply, CommandRouteError>;
}
