//! Production Socket Mode transport: `apps.connections.open` for the
//! WebSocket URL, then a tungstenite stream pumped through the
//! [`SocketTransport`] seam.

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use async_trait::async_trait;

use crate::commands::SlashCommandPayload;
use crate::events::{SlackEnvelope, SlackEvent};
use crate::socket::{SocketTransport, TransportError};

const DEFAULT_API_BASE: &str = "https://slack.com/api";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    http: reqwest::Client,
    app_token: SecretString,
    base_url: String,
    stream: Mutex<Option<WsStream>>,
}

impl WebSocketTransport {
    pub fn new(http: reqwest::Client, app_token: SecretString) -> Self {
        Self::with_base_url(http, app_token, DEFAULT_API_BASE)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        app_token: SecretString,
        base_url: impl Into<String>,
    ) -> Self {
        Self { http, app_token, base_url: base_url.into(), stream: Mutex::new(None) }
    }

    /// `apps.connections.open` with the app-level token; returns the
    /// single-use wss URL.
    async fn open_connection_url(&self) -> Result<String, TransportError> {
        let payload: Value = self
            .http
            .post(format!("{}/apps.connections.open", self.base_url))
            .bearer_auth(self.app_token.expose_secret())
            .send()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?
            .json()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        if payload.get("ok").and_then(Value::as_bool) != Some(true) {
            let code = payload.get("error").and_then(Value::as_str).unwrap_or("unknown");
            return Err(TransportError::Connect(format!(
                "apps.connections.open rejected: {code}"
            )));
        }

        let url = payload
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                TransportError::Connect("apps.connections.open returned no url".to_owned())
            })?
            .to_owned();

        validate_wss_url(&url)?;
        Ok(url)
    }
}

/// The connection URL must be wss:// on a *.slack.com host; anything else
/// means a misissued or tampered response.
fn validate_wss_url(url: &str) -> Result<(), TransportError> {
    if !url.starts_with("wss://") {
        return Err(TransportError::Connect(format!(
            "socket mode url must use wss://, got scheme {}",
            url.split("://").next().unwrap_or("unknown")
        )));
    }

    let host = url
        .strip_prefix("wss://")
        .and_then(|rest| rest.split('/').next())
        .and_then(|host_port| host_port.split(':').next())
        .unwrap_or("");
    if host != "slack.com" && !host.ends_with(".slack.com") {
        return Err(TransportError::Connect(format!(
            "socket mode url host must be *.slack.com, got {host}"
        )));
    }

    Ok(())
}

/// One decoded Socket Mode frame. Control frames (`hello`, `disconnect`)
/// never reach the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Frame {
    Hello,
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
    Unparseable(String),
}

fn decode_frame(raw: &Value) -> Frame {
    match raw.get("type").and_then(Value::as_str) {
        Some("hello") => Frame::Hello,
        Some("disconnect") => {
            let reason =
                raw.get("reason").and_then(Value::as_str).unwrap_or("unknown").to_owned();
            Frame::Disconnect { reason }
        }
        Some(frame_type) => match decode_envelope(frame_type, raw) {
            Some(envelope) => Frame::Envelope(envelope),
            None => Frame::Unparseable(format!("{frame_type} frame without envelope_id")),
        },
        None => Frame::Unparseable("frame without a type field".to_owned()),
    }
}

fn decode_envelope(frame_type: &str, raw: &Value) -> Option<SlackEnvelope> {
    let envelope_id = raw.get("envelope_id").and_then(Value::as_str)?.to_owned();

    let event = if frame_type == "slash_commands" {
        match decode_slash_payload(&envelope_id, raw.get("payload")) {
            Some(payload) => SlackEvent::SlashCommand(payload),
            None => SlackEvent::Unsupported { event_type: frame_type.to_owned() },
        }
    } else {
        SlackEvent::Unsupported { event_type: frame_type.to_owned() }
    };

    Some(SlackEnvelope { envelope_id, event })
}

/// Wire shape of a `slash_commands` payload; only the fields this bot
/// consumes are modeled.
#[derive(Debug, Deserialize)]
struct WireSlashPayload {
    command: String,
    #[serde(default)]
    text: String,
    channel_id: String,
    user_id: String,
    #[serde(default)]
    trigger_id: String,
}

fn decode_slash_payload(envelope_id: &str, payload: Option<&Value>) -> Option<SlashCommandPayload> {
    let wire: WireSlashPayload = serde_json::from_value(payload?.clone()).ok()?;

    Some(SlashCommandPayload {
        command: wire.command,
        text: wire.text,
        channel_id: wire.channel_id,
        user_id: wire.user_id,
        trigger_id: wire.trigger_id,
        request_id: envelope_id.to_owned(),
    })
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self.open_connection_url().await?;
        let (stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        *self.stream.lock().await = Some(stream);
        info!("socket mode websocket established");
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| TransportError::Receive("transport not connected".to_owned()))?;

        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                None => {
                    guard.take();
                    return Ok(None);
                }
            };

            match message {
                WsMessage::Text(text) => {
                    let raw: Value = match serde_json::from_str(&text) {
                        Ok(value) => value,
                        Err(error) => {
                            warn!(error = %error, "discarding unparseable socket frame");
                            continue;
                        }
                    };

                    match decode_frame(&raw) {
                        Frame::Hello => {
                            info!("socket mode hello received");
                        }
                        Frame::Disconnect { reason } => {
                            guard.take();
                            return Err(TransportError::Receive(format!(
                                "server requested disconnect: {reason}"
                            )));
                        }
                        Frame::Envelope(envelope) => return Ok(Some(envelope)),
                        Frame::Unparseable(detail) => {
                            warn!(detail = %detail, "discarding malformed socket frame");
                        }
                    }
                }
                WsMessage::Ping(data) => {
                    if let Err(error) = stream.send(WsMessage::Pong(data)).await {
                        return Err(TransportError::Receive(error.to_string()));
                    }
                }
                WsMessage::Close(_) => {
                    guard.take();
                    return Err(TransportError::Receive("closed by server".to_owned()));
                }
                _ => {
                    debug!("ignoring non-text socket frame");
                }
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| TransportError::Acknowledge("transport not connected".to_owned()))?;

        let ack = serde_json::json!({ "envelope_id": envelope_id }).to_string();
        stream
            .send(WsMessage::Text(ack.into()))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            stream
                .close(None)
                .await
                .map_err(|error| TransportError::Disconnect(error.to_string()))?;
        }
        Ok(())
    }
}
