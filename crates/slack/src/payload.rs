use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::commands::SlashCommandPayload;
use crate::events::{MessageEvent, SlackEnvelope, SlackEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("events api body is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("slash command body is missing `{0}`")]
    MissingFormField(&'static str),
}

/// What an Events API request asks of the bot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventsApiRequest {
    UrlVerification { challenge: String },
    Callback(SlackEnvelope),
    Ignored,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawRequest {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        #[serde(default)]
        event_id: Option<String>,
        event: RawEvent,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

pub fn parse_events_api(body: &[u8]) -> Result<EventsApiRequest, PayloadError> {
    let raw: RawRequest =
        serde_json::from_slice(body).map_err(|error| PayloadError::InvalidJson(error.to_string()))?;

    Ok(match raw {
        RawRequest::UrlVerification { challenge } => EventsApiRequest::UrlVerification { challenge },
        RawRequest::EventCallback { event_id, event } => EventsApiRequest::Callback(SlackEnvelope {
            envelope_id: event_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            event: callback_event(event),
        }),
        RawRequest::Other => EventsApiRequest::Ignored,
    })
}

fn callback_event(event: RawEvent) -> SlackEvent {
    match (event.event_type.as_str(), event.channel, event.ts) {
        ("message", Some(channel_id), Some(ts)) => SlackEvent::ChannelMessage(MessageEvent {
            channel_id,
            user_id: event.user,
            text: event.text.unwrap_or_default(),
            ts,
            subtype: event.subtype,
            bot_id: event.bot_id,
            thread_ts: event.thread_ts,
        }),
        _ => SlackEvent::Unsupported { event_type: event.event_type },
    }
}

/// Parses the `application/x-www-form-urlencoded` body Slack posts for a
/// slash command. The request id is generated here; Slack does not send one.
pub fn parse_slash_command(body: &[u8]) -> Result<SlackEnvelope, PayloadError> {
    let mut command = None;
    let mut text = None;
    let mut channel_id = None;
    let mut user_id = None;
    let mut trigger_id = None;

    for (key, value) in url::form_urlencoded::parse(body) {
        let slot = match &*key {
            "command" => &mut command,
            "text" => &mut text,
            "channel_id" => &mut channel_id,
            "user_id" => &mut user_id,
            "trigger_id" => &mut trigger_id,
            _ => continue,
        };
        *slot = Some(value.into_owned());
    }

    let request_id = Uuid::new_v4().to_string();
    Ok(SlackEnvelope {
        envelope_id: request_id.clone(),
        event: SlackEvent::SlashCommand(SlashCommandPayload {
            command: command.ok_or(PayloadError::MissingFormField("command"))?,
            text: text.unwrap_or_default(),
            channel_id: channel_id.ok_or(PayloadError::MissingFormField("channel_id"))?,
            user_id: user_id.ok_or(PayloadError::MissingFormField("user_id"))?,
            trigger_id: trigger_id.unwrap_or_default(),
            request_id,
        }),
    })
}
