//! Socket Mode over a real websocket: `apps.connections.open`, then one JSON envelope
//! per text frame.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::api::SlackWebClient;
use crate::events::{BlockActionEvent, MentionEvent, SlackEnvelope, SlackEvent};
use crate::socket::{SocketTransport, TransportError};

type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    web: SlackWebClient,
    stream: Mutex<Option<SocketStream>>,
}

impl WebSocketTransport {
    pub fn new(web: SlackWebClient) -> Self {
        Self { web, stream: Mutex::new(None) }
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .web
            .open_socket_connection()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Ok(None);
        };

        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                None => {
                    *guard = None;
                    return Err(TransportError::Receive("socket closed by server".to_owned()));
                }
            };

            match parse_socket_message(message) {
                Ok(SocketFrame::Envelope(envelope)) => return Ok(Some(envelope)),
                Ok(SocketFrame::Hello) => info!("socket mode session ready"),
                Ok(SocketFrame::Disconnect(reason)) => {
                    return Err(TransportError::Receive(format!(
                        "slack requested reconnect: {reason}"
                    )));
                }
                Ok(SocketFrame::Control) => {}
                Err(error) => warn!(error = %error, "discarding unreadable socket frame"),
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(TransportError::Acknowledge("socket is not connected".to_owned()));
        };

        let ack = json!({ "envelope_id": envelope_id }).to_string();
        stream
            .send(WsMessage::Text(ack.into()))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };
        stream.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Envelope(SlackEnvelope),
    Hello,
    Disconnect(String),
    /// Ping, pong, close and raw frames; nothing to deliver.
    Control,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventsApiPayload {
    event: EventPayload,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    ts: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct InteractivePayload {
    #[serde(rename = "type")]
    payload_type: String,
    #[serde(default)]
    user: Option<IdRef>,
    #[serde(default)]
    channel: Option<IdRef>,
    #[serde(default)]
    container: Option<Container>,
    #[serde(default)]
    actions: Vec<ActionPayload>,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Container {
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    message_ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActionPayload {
    action_id: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    selected_option: Option<SelectedOption>,
}

#[derive(Debug, Deserialize)]
struct SelectedOption {
    value: String,
}

pub fn parse_socket_message(message: WsMessage) -> Result<SocketFrame, serde_json::Error> {
    match message {
        WsMessage::Text(text) => parse_socket_text(text.as_str()),
        WsMessage::Binary(bytes) => {
            let raw = serde_json::from_slice::<RawEnvelope>(&bytes)?;
            Ok(classify(raw))
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
            Ok(SocketFrame::Control)
        }
    }
}

pub fn parse_socket_text(text: &str) -> Result<SocketFrame, serde_json::Error> {
    let raw = serde_json::from_str::<RawEnvelope>(text)?;
    Ok(classify(raw))
}

fn classify(raw: RawEnvelope) -> SocketFrame {
    match raw.envelope_type.as_str() {
        "hello" => return SocketFrame::Hello,
        "disconnect" => {
            return SocketFrame::Disconnect(raw.reason.unwrap_or_else(|| "unspecified".to_owned()))
        }
        _ => {}
    }

    let Some(envelope_id) = raw.envelope_id.filter(|id| !id.is_empty()) else {
        debug!(envelope_type = %raw.envelope_type, "socket frame without envelope id");
        return SocketFrame::Control;
    };

    let event = match raw.envelope_type.as_str() {
        "events_api" => events_api_event(raw.payload),
        "interactive" => interactive_event(raw.payload),
        other => SlackEvent::Unsupported { event_type: other.to_owned() },
    };
    SocketFrame::Envelope(SlackEnvelope { envelope_id, event })
}

fn events_api_event(payload: Value) -> SlackEvent {
    let event = match serde_json::from_value::<EventsApiPayload>(payload) {
        Ok(payload) => payload.event,
        Err(error) => {
            return SlackEvent::Unsupported { event_type: format!("events_api ({error})") }
        }
    };

    if event.event_type != "app_mention" {
        return SlackEvent::Unsupported { event_type: event.event_type };
    }
    SlackEvent::Mention(MentionEvent {
        channel_id: event.channel,
        message_ts: event.ts,
        user_id: event.user,
        text: event.text,
    })
}

/// Only the first action is delivered; Slack sends one per click.
fn interactive_event(payload: Value) -> SlackEvent {
    let payload = match serde_json::from_value::<InteractivePayload>(payload) {
        Ok(payload) => payload,
        Err(error) => {
            return SlackEvent::Unsupported { event_type: format!("interactive ({error})") }
        }
    };
    if payload.payload_type != "block_actions" {
        return SlackEvent::Unsupported { event_type: payload.payload_type };
    }

    let container = payload.container.unwrap_or(Container { channel_id: None, message_ts: None });
    let channel_id = payload.channel.map(|channel| channel.id).or(container.channel_id);
    let (Some(channel_id), Some(message_ts), Some(action)) =
        (channel_id, container.message_ts, payload.actions.into_iter().next())
    else {
        return SlackEvent::Unsupported { event_type: "block_actions (incomplete)".to_owned() };
    };

    let value = action.value.or_else(|| action.selected_option.map(|option| option.value));
    SlackEvent::BlockAction(BlockActionEvent {
        channel_id,
        message_ts,
        user_id: payload.user.map(|user| user.id).unwrap_or_default(),
        action_id: action.action_id,
        value,
    })
}
