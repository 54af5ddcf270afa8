//! Slack Web API surface the bot needs: posting, threading and updating messages,
//! and opening Socket Mode connections.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::blocks::MessageTemplate;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("slack http request failed: {0}")]
    Http(String),
    #[error("slack {method} failed: {error}")]
    Api { method: &'static str, error: String },
    #[error("slack {method} returned an unexpected response: {detail}")]
    InvalidResponse { method: &'static str, detail: String },
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Returns the ts of the posted message.
    async fn post_message(&self, channel: &str, message: &MessageTemplate)
        -> Result<String, ChatError>;
    /// Posts under the message `thread_ts`; returns the ts of the reply.
    async fn post_thread_reply(
        &self,
        channel: &str,
        thread_ts: &str,
        message: &MessageTemplate,
    ) -> Result<String, ChatError>;
    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        message: &MessageTemplate,
    ) -> Result<(), ChatError>;
}

#[derive(Debug, Deserialize)]
struct SlackOpenSocketResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct SlackWebClient {
    http: reqwest::Client,
    api_base: String,
    app_token: SecretString,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(
        api_base: &str,
        app_token: SecretString,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("deckhand/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|error| ChatError::Http(error.to_string()))?;

        Ok(Self { http, api_base: api_base.trim_end_matches('/').to_owned(), app_token, bot_token })
    }

    pub async fn open_socket_connection(&self) -> Result<String, ChatError> {
        const METHOD: &str = "apps.connections.open";
        let response: SlackOpenSocketResponse =
            self.call(METHOD, self.app_token.expose_secret(), None).await?;
        if !response.ok {
            return Err(api_error(METHOD, response.error));
        }
        response.url.filter(|url| !url.trim().is_empty()).ok_or(ChatError::InvalidResponse {
            method: METHOD,
            detail: "missing url".to_owned(),
        })
    }

    async fn post(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<String, ChatError> {
        const METHOD: &str = "chat.postMessage";
        let mut payload = message_payload(message);
        payload["channel"] = Value::String(channel.to_owned());
        if let Some(thread_ts) = thread_ts {
            payload["thread_ts"] = Value::String(thread_ts.to_owned());
        }

        let response: SlackChatMessageResponse =
            self.call(METHOD, self.bot_token.expose_secret(), Some(&payload)).await?;
        if !response.ok {
            return Err(api_error(METHOD, response.error));
        }
        response.ts.ok_or(ChatError::InvalidResponse { method: METHOD, detail: "missing ts".to_owned() })
    }

    async fn call<T>(
        &self,
        method: &'static str,
        token: &str,
        payload: Option<&Value>,
    ) -> Result<T, ChatError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut request =
            self.http.post(format!("{}/{method}", self.api_base)).bearer_auth(token);
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|error| ChatError::Http(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Http(format!("{method} returned status {status}")));
        }
        response.json::<T>().await.map_err(|error| ChatError::InvalidResponse {
            method,
            detail: error.to_string(),
        })
    }
}

#[async_trait]
impl ChatClient for SlackWebClient {
    async fn post_message(
        &self,
        channel: &str,
        message: &MessageTemplate,
    ) -> Result<String, ChatError> {
        self.post(channel, None, message).await
    }

    async fn post_thread_reply(
        &self,
        channel: &str,
        thread_ts: &str,
        message: &MessageTemplate,
    ) -> Result<String, ChatError> {
        self.post(channel, Some(thread_ts), message).await
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        message: &MessageTemplate,
    ) -> Result<(), ChatError> {
        const METHOD: &str = "chat.update";
        let mut payload = message_payload(message);
        payload["channel"] = Value::String(channel.to_owned());
        payload["ts"] = Value::String(ts.to_owned());

        let response: SlackChatMessageResponse =
            self.call(METHOD, self.bot_token.expose_secret(), Some(&payload)).await?;
        if !response.ok {
            return Err(api_error(METHOD, response.error));
        }
        Ok(())
    }
}

fn api_error(method: &'static str, error: Option<String>) -> ChatError {
    ChatError::Api { method, error: error.unwrap_or_else(|| "unknown error".to_owned()) }
}

/// Coloured templates go out as a single attachment; Slack only renders the side bar there.
pub fn message_payload(message: &MessageTemplate) -> Value {
    match message.color {
        Some(color) => json!({
            "text": message.fallback_text,
            "attachments": [{ "color": color.hex(), "blocks": message.blocks }],
        }),
        None => json!({ "text": message.fallback_text, "blocks": message.blocks }),
    }
}
