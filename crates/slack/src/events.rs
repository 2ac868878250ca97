use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use attendly_core::domain::event::EventId;
use thiserror::Error;

use crate::{
    blocks::MessageTemplate,
    commands::{
        normalize_query_command, AnalyticsCommandService, CommandParseError, CommandReply,
        CommandRouteError, CommandRouter, SlashCommandPayload,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    ChannelMessage(MessageEvent),
    SlashCommand(SlashCommandPayload),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::ChannelMessage(_) => SlackEventType::ChannelMessage,
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// Channel and user to notify when a worker fails without producing a reply.
    pub fn reply_target(&self) -> Option<(&str, &str)> {
        match self {
            Self::ChannelMessage(event) => {
                event.user_id.as_deref().map(|user_id| (event.channel_id.as_str(), user_id))
            }
            Self::SlashCommand(payload) => {
                Some((payload.channel_id.as_str(), payload.user_id.as_str()))
            }
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    ChannelMessage,
    SlashCommand,
    Unsupported,
}

/// A `message` event from the Events API.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub user_id: Option<String>,
    pub text: String,
    pub ts: String,
    pub subtype: Option<String>,
    pub bot_id: Option<String>,
    pub thread_ts: Option<String>,
}

impl MessageEvent {
    pub fn event_id(&self) -> EventId {
        EventId::for_message(&self.channel_id, &self.ts)
    }

    /// Why this message is not a human statement to interpret, if it isn't one.
    pub fn skip_reason(&self, bot_user_id: Option<&str>) -> Option<&'static str> {
        if self.subtype.as_deref().is_some_and(|subtype| !subtype.is_empty()) {
            return Some("subtype");
        }
        if self.bot_id.as_deref().is_some_and(|bot_id| !bot_id.is_empty()) {
            return Some("bot_message");
        }
        if self.thread_ts.as_deref().is_some_and(|thread_ts| !thread_ts.is_empty()) {
            return Some("thread_reply");
        }
        match (self.user_id.as_deref(), bot_user_id) {
            (None, _) => Some("no_author"),
            (Some(author), Some(bot)) if author == bot => Some("own_message"),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
    pub bot_user_id: Option<String>,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned(), bot_user_id: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Audience {
    Channel,
    Ephemeral { user_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub channel_id: String,
    pub audience: Audience,
    pub message: MessageTemplate,
}

impl Reply {
    pub fn channel(channel_id: impl Into<String>, message: MessageTemplate) -> Self {
        Self { channel_id: channel_id.into(), audience: Audience::Channel, message }
    }

    pub fn ephemeral(
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        message: MessageTemplate,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            audience: Audience::Ephemeral { user_id: user_id.into() },
            message,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(Reply),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Route(#[from] CommandRouteError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// The leave pipeline seen from the Slack side. `None` means the message was
/// consumed without anything to say back (duplicates, for instance).
#[async_trait]
pub trait LeaveMessageService: Send + Sync {
    async fn handle_leave_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<Reply>, EventHandlerError>;
}

pub struct ChannelMessageHandler<S> {
    service: S,
}

impl<S> ChannelMessageHandler<S>
where
    S: LeaveMessageService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ChannelMessageHandler<S>
where
    S: LeaveMessageService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ChannelMessage
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ChannelMessage(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        if let Some(reason) = event.skip_reason(ctx.bot_user_id.as_deref()) {
            tracing::debug!(
                event_name = "slack.message.skipped",
                correlation_id = %ctx.correlation_id,
                channel_id = %event.channel_id,
                reason,
                "skipping non-user message"
            );
            return Ok(HandlerResult::Ignored);
        }

        Ok(match self.service.handle_leave_message(event, ctx).await? {
            Some(reply) => HandlerResult::Responded(reply),
            None => HandlerResult::Processed,
        })
    }
}

pub struct SlashCommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: AnalyticsCommandService,
{
    pub fn new(service: S, command_name: impl Into<String>) -> Self {
        Self { router: CommandRouter::new(service, command_name) }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: AnalyticsCommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let command = normalize_query_command(payload.clone(), self.router.command_name())?;
        let channel_id = command.channel_id.clone();
        let user_id = command.user_id.clone();

        Ok(HandlerResult::Responded(match self.router.route(command).await? {
            CommandReply::Report(message) => Reply::channel(channel_id, message),
            CommandReply::Private(message) => Reply::ephemeral(channel_id, user_id, message),
        }))
    }
}
