use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::blocks::{Block, MessageTemplate};
use crate::events::{Audience, Reply};

pub const SLACK_API_BASE: &str = "https://slack.com/api/";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("slack request failed: {0}")]
    Request(String),
    #[error("slack returned HTTP {0}")]
    Status(u16),
    #[error("slack method `{method}` failed: {error}")]
    Api { method: &'static str, error: String },
    #[error("slack method `{method}` response is missing `{field}`")]
    MissingField { method: &'static str, field: &'static str },
    #[error("invalid slack api url: {0}")]
    InvalidUrl(String),
}

/// Outbound half of the chat transport.
#[async_trait]
pub trait SlackWebApi: Send + Sync {
    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), TransportError>;

    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), TransportError>;

    /// The user's Slack handle (`users.info` → `user.name`).
    async fn user_name(&self, user_id: &str) -> Result<String, TransportError>;

    /// The bot's own user id (`auth.test` → `user_id`).
    async fn bot_user_id(&self) -> Result<String, TransportError>;
}

pub async fn deliver(api: &dyn SlackWebApi, reply: &Reply) -> Result<(), TransportError> {
    match &reply.audience {
        Audience::Channel => api.post_message(&reply.channel_id, &reply.message).await,
        Audience::Ephemeral { user_id } => {
            api.post_ephemeral(&reply.channel_id, user_id, &reply.message).await
        }
    }
}

#[derive(Debug, Serialize)]
struct PostMessageBody<'a> {
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    text: &'a str,
    #[serde(skip_serializing_if = "<[Block]>::is_empty")]
    blocks: &'a [Block],
}

impl<'a> PostMessageBody<'a> {
    fn new(channel: &'a str, user: Option<&'a str>, message: &'a MessageTemplate) -> Self {
        Self { channel, user, text: &message.fallback_text, blocks: &message.blocks }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserProfile {
    #[serde(default)]
    name: Option<String>,
}

impl ApiResponse {
    fn into_checked(self, method: &'static str) -> Result<Self, TransportError> {
        if self.ok {
            Ok(self)
        } else {
            Err(TransportError::Api {
                method,
                error: self.error.unwrap_or_else(|| "unknown_error".to_owned()),
            })
        }
    }
}

/// `reqwest` client for the handful of Web API methods the bot uses.
#[derive(Clone)]
pub struct SlackWebClient {
    http: reqwest::Client,
    base_url: Url,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(bot_token: SecretString) -> Result<Self, TransportError> {
        Self::with_base_url(SLACK_API_BASE, bot_token, Duration::from_secs(10))
    }

    pub fn with_base_url(
        base_url: &str,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let normalized =
            if base_url.ends_with('/') { base_url.to_owned() } else { format!("{base_url}/") };
        let base_url =
            Url::parse(&normalized).map_err(|error| TransportError::InvalidUrl(error.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::Request(error.to_string()))?;
        Ok(Self { http, base_url, bot_token })
    }

    fn method_url(&self, method: &str) -> Result<Url, TransportError> {
        self.base_url.join(method).map_err(|error| TransportError::InvalidUrl(error.to_string()))
    }

    async fn call(
        &self,
        method: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiResponse, TransportError> {
        let response = request
            .bearer_auth(self.bot_token.expose_secret())
            .send()
            .await
            .map_err(|error| TransportError::Request(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body: ApiResponse =
            response.json().await.map_err(|error| TransportError::Request(error.to_string()))?;
        body.into_checked(method)
    }

    async fn post(
        &self,
        method: &'static str,
        body: &PostMessageBody<'_>,
    ) -> Result<(), TransportError> {
        let request = self.http.post(self.method_url(method)?).json(body);
        self.call(method, request).await.map(|_| ())
    }
}

#[async_trait]
impl SlackWebApi for SlackWebClient {
    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), TransportError> {
        self.post("chat.postMessage", &PostMessageBody::new(channel_id, None, message)).await
    }

    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), TransportError> {
        self.post("chat.postEphemeral", &PostMessageBody::new(channel_id, Some(user_id), message))
            .await
    }

    async fn user_name(&self, user_id: &str) -> Result<String, TransportError> {
        const METHOD: &str = "users.info";
        let mut url = self.method_url(METHOD)?;
        url.query_pairs_mut().append_pair("user", user_id);

        let response = self.call(METHOD, self.http.get(url)).await?;
        response
            .user
            .and_then(|user| user.name)
            .filter(|name| !name.is_empty())
            .ok_or(TransportError::MissingField { method: METHOD, field: "user.name" })
    }

    async fn bot_user_id(&self) -> Result<String, TransportError> {
        const METHOD: &str = "auth.test";
        let response = self.call(METHOD, self.http.post(self.method_url(METHOD)?)).await?;
        response.user_id.ok_or(TransportError::MissingField { method: METHOD, field: "user_id" })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use super::{
        deliver, ApiResponse, PostMessageBody, SlackWebApi, SlackWebClient, TransportError,
    };
    use crate::blocks::{MessageBuilder, MessageTemplate};
    use crate::events::Reply;

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SlackWebApi for RecordingApi {
        async fn post_message(
            &self,
            channel_id: &str,
            message: &MessageTemplate,
        ) -> Result<(), TransportError> {
            self.calls.lock().expect("lock").push(format!("message:{channel_id}:{}", message.fallback_text));
            Ok(())
        }

        async fn post_ephemeral(
            &self,
            channel_id: &str,
            user_id: &str,
            message: &MessageTemplate,
        ) -> Result<(), TransportError> {
            self.calls
                .lock()
                .expect("lock")
                .push(format!("ephemeral:{channel_id}:{user_id}:{}", message.fallback_text));
            Ok(())
        }

        async fn user_name(&self, user_id: &str) -> Result<String, TransportError> {
            Ok(user_id.to_lowercase())
        }

        async fn bot_user_id(&self) -> Result<String, TransportError> {
            Ok("UBOT".to_owned())
        }
    }

    #[tokio::test]
    async fn deliver_routes_by_audience() {
        let api = RecordingApi::default();
        deliver(&api, &Reply::channel("C1", MessageTemplate::text("hello"))).await.expect("deliver");
        deliver(&api, &Reply::ephemeral("C1", "U1", MessageTemplate::text("psst")))
            .await
            .expect("deliver");

        assert_eq!(
            &*api.calls.lock().expect("lock"),
            &["message:C1:hello".to_owned(), "ephemeral:C1:U1:psst".to_owned()]
        );
    }

    #[test]
    fn text_only_body_omits_blocks_and_user() {
        let message = MessageTemplate::text("hello");
        let value =
            serde_json::to_value(PostMessageBody::new("C1", None, &message)).expect("serialize");
        assert_eq!(value, serde_json::json!({"channel": "C1", "text": "hello"}));
    }

    #[test]
    fn ephemeral_body_carries_user_and_blocks() {
        let message = MessageBuilder::new("fallback")
            .section("s", |section| {
                section.mrkdwn("*hi*");
            })
            .build();
        let value = serde_json::to_value(PostMessageBody::new("C1", Some("U1"), &message))
            .expect("serialize");
        assert_eq!(value["user"], "U1");
        assert_eq!(value["blocks"][0]["type"], "section");
        assert_eq!(value["blocks"][0]["text"]["type"], "mrkdwn");
    }

    #[test]
    fn api_errors_surface_slack_error_code() {
        let response: ApiResponse =
            serde_json::from_str(r#"{"ok": false, "error": "channel_not_found"}"#).expect("json");
        assert_eq!(
            response.into_checked("chat.postMessage").unwrap_err(),
            TransportError::Api { method: "chat.postMessage", error: "channel_not_found".to_owned() }
        );

        let response: ApiResponse =
            serde_json::from_str(r#"{"ok": true, "user": {"name": "ravi", "real_name": "Ravi K"}}"#)
                .expect("json");
        let checked = response.into_checked("users.info").expect("ok");
        assert_eq!(checked.user.and_then(|user| user.name).as_deref(), Some("ravi"));
    }

    #[test]
    fn method_urls_resolve_against_base() {
        let client = SlackWebClient::with_base_url(
            "http://127.0.0.1:9/api",
            SecretString::from("xoxb-test".to_owned()),
            std::time::Duration::from_secs(1),
        )
        .expect("client");
        assert_eq!(
            client.method_url("users.info").expect("url").as_str(),
            "http://127.0.0.1:9/api/users.info"
        );
    }
}
