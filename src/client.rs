//! WebSocket client for the hub.
//!
//! Requests are sent one at a time: [`HubClient::request`] writes a frame and reads until
//! the matching acknowledgement, collecting any `error` events that arrive on the way.
//! The client remembers the last session token it was given and sends it back with
//! every request, the way a browser client would.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::config::DEFAULT_SESSION_KEY_FIELD;
use crate::error::AppError;
use crate::server::protocol::{InboundFrame, OutboundFrame, RequestEnvelope, ResponseEnvelope};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Acknowledgement for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub id: u64,
    pub error: Option<AppError>,
    pub response: Option<ResponseEnvelope>,
}

impl Ack {
    pub fn is_ok(&self) -> bool { self.error.is_none() }

    pub fn data(&self) -> Option<&Value> { self.response.as_ref().map(|r| &r.data) }

    pub fn token(&self) -> Option<&str> { self.response.as_ref().map(|r| r.token.as_str()) }

    pub fn code(&self) -> Option<&str> { self.error.as_ref().map(AppError::code_str) }
}

pub struct HubClient {
    stream: WsStream,
    key_field: String,
    next_id: u64,
    token: Option<String>,
    events: Vec<AppError>,
}

impl HubClient {
    /// Connect to `ws://host:port/ws` using the default token field.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_key_field(url, DEFAULT_SESSION_KEY_FIELD).await
    }

    pub async fn connect_with_key_field(url: &str, key_field: &str) -> Result<Self> {
        let (stream, _resp) = tokio_tungstenite::connect_async(url)
            .await
            .with_context(|| format!("failed to connect to {url}"))?;
        Ok(Self { stream, key_field: key_field.to_string(), next_id: 1, token: None, events: Vec::new() })
    }

    /// Last token received from the server, if any.
    pub fn token(&self) -> Option<&str> { self.token.as_deref() }

    pub fn set_token(&mut self, token: Option<String>) { self.token = token; }

    /// `error` events received so far, oldest first. Clears the buffer.
    pub fn take_events(&mut self) -> Vec<AppError> { std::mem::take(&mut self.events) }

    /// Send `op` with the remembered token (empty tokens are not sent).
    pub async fn request(&mut self, op: &str, data: Value) -> Result<Ack> {
        let token = self.token.clone().filter(|t| !t.is_empty());
        self.request_with_token(op, data, token.as_deref()).await
    }

    /// Send `op` with an explicit token (or none), bypassing the remembered one.
    pub async fn request_with_token(&mut self, op: &str, data: Value, token: Option<&str>) -> Result<Ack> {
        let id = self.next_id;
        self.next_id += 1;
        let frame = InboundFrame { id: Some(id), op: op.to_string(), payload: Some(self.payload(data, token)) };
        self.send_raw(&serde_json::to_string(&frame)?).await?;
        let ack = self.wait_ack(id).await?;
        if let Some(t) = ack.token() {
            self.token = Some(t.to_string());
        }
        Ok(ack)
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Wait up to `within` for the next `error` event.
    pub async fn next_event(&mut self, within: Duration) -> Result<Option<AppError>> {
        if !self.events.is_empty() {
            return Ok(Some(self.events.remove(0)));
        }
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let frame = match tokio::time::timeout_at(deadline, self.read_frame()).await {
                Ok(frame) => frame?,
                Err(_) => return Ok(None),
            };
            if let OutboundFrame::Event { event, data } = frame {
                if let Some(err) = Self::event_error(&event, data) {
                    return Ok(Some(err));
                }
            }
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }

    fn payload(&self, data: Value, token: Option<&str>) -> Value {
        RequestEnvelope { data, token: token.map(str::to_string) }.to_wire(&self.key_field)
    }

    fn event_error(event: &str, data: Value) -> Option<AppError> {
        if event != "error" { return None; }
        serde_json::from_value(data).ok()
    }

    async fn read_frame(&mut self) -> Result<OutboundFrame> {
        loop {
            let msg = self.stream.next().await.ok_or_else(|| anyhow!("connection closed"))??;
            match msg {
                Message::Text(text) => return serde_json::from_str(&text).context("invalid frame from server"),
                Message::Close(_) => return Err(anyhow!("connection closed")),
                _ => continue,
            }
        }
    }

    async fn wait_ack(&mut self, want: u64) -> Result<Ack> {
        loop {
            match self.read_frame().await? {
                OutboundFrame::Ack { id, error, response } if id == want => {
                    let error = error.map(serde_json::from_value::<AppError>).transpose().context("invalid error value")?;
                    let response = match response {
                        Some(v) => Some(
                            ResponseEnvelope::from_wire(&v, &self.key_field)
                                .ok_or_else(|| anyhow!("response without '{}'", self.key_field))?,
                        ),
                        None => None,
                    };
                    return Ok(Ack { id, error, response });
                }
                OutboundFrame::Ack { id, .. } => debug!(id, "ignoring ack for another request"),
                OutboundFrame::Event { event, data } => {
                    if let Some(err) = Self::event_error(&event, data) {
                        self.events.push(err);
                    }
                }
            }
        }
    }
}
