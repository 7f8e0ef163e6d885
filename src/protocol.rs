//! Push channel wire format
//!
//! Every frame on the push channel is one JSON object:
//!
//! ```json
//! { "type": "energy_update", "data": { ... }, "timestamp": "2026-01-01T12:00:00Z", "id": "..." }
//! ```
//!
//! Inside the crate a frame is an [`Envelope`] whose [`Payload`] is an exhaustive enum, so
//! every message kind has to be handled explicitly. Types this crate does not know are kept
//! as [`Payload::Other`] and forwarded untouched.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::TickResult;

pub const ENERGY_UPDATE: &str = "energy_update";
pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const ERROR: &str = "error";
pub const ALERT_ACKNOWLEDGED: &str = "alert_acknowledged";

#[derive(Debug)]
pub enum ProtocolError {
    /// Frame is not a JSON envelope
    Malformed(String),

    /// Envelope is well formed but its data does not match its type
    InvalidPayload { kind: String, reason: String },

    /// Envelope could not be encoded
    Encode(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Malformed(msg) => write!(f, "malformed envelope: {msg}"),
            ProtocolError::InvalidPayload { kind, reason } => {
                write!(f, "invalid '{kind}' payload: {reason}")
            }
            ProtocolError::Encode(msg) => write!(f, "failed to encode envelope: {msg}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    EnergyUpdate(TickResult),
    Ping,
    Pong,
    Error { message: String },
    AlertAcknowledged { id: String },
    Other { kind: String, data: Value },
}

impl Payload {
    pub fn kind(&self) -> &str {
        match self {
            Payload::EnergyUpdate(_) => ENERGY_UPDATE,
            Payload::Ping => PING,
            Payload::Pong => PONG,
            Payload::Error { .. } => ERROR,
            Payload::AlertAcknowledged { .. } => ALERT_ACKNOWLEDGED,
            Payload::Other { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope", into = "RawEnvelope")]
pub struct Envelope {
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
    pub id: Option<String>,
}

/// JSON shape of an envelope before the payload is interpreted
#[derive(Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = ProtocolError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        let invalid = |reason: String| ProtocolError::InvalidPayload {
            kind: raw.kind.clone(),
            reason,
        };

        let payload = match raw.kind.as_str() {
            ENERGY_UPDATE => Payload::EnergyUpdate(
                serde_json::from_value(raw.data.clone()).map_err(|e| invalid(e.to_string()))?,
            ),
            PING => Payload::Ping,
            PONG => Payload::Pong,
            ERROR => {
                let message = match &raw.data {
                    Value::String(message) => message.clone(),
                    data => data
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| invalid("missing 'message'".to_string()))?,
                };
                Payload::Error { message }
            }
            ALERT_ACKNOWLEDGED => {
                let id = raw
                    .data
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| invalid("missing 'id'".to_string()))?;
                Payload::AlertAcknowledged { id }
            }
            _ => Payload::Other {
                kind: raw.kind.clone(),
                data: raw.data.clone(),
            },
        };

        Ok(Envelope {
            payload,
            timestamp: raw.timestamp,
            id: raw.id,
        })
    }
}

impl From<Envelope> for RawEnvelope {
    fn from(envelope: Envelope) -> Self {
        let kind = envelope.payload.kind().to_string();
        let data = match envelope.payload {
            // TickResult holds only plain data, so serialising it cannot fail
            Payload::EnergyUpdate(update) => serde_json::to_value(update).unwrap_or_default(),
            Payload::Ping | Payload::Pong => json!({}),
            Payload::Error { message } => json!({ "message": message }),
            Payload::AlertAcknowledged { id } => json!({ "id": id }),
            Payload::Other { data, .. } => data,
        };

        RawEnvelope {
            kind,
            data,
            timestamp: envelope.timestamp,
            id: envelope.id,
        }
    }
}

impl Envelope {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn energy_update(update: TickResult) -> Self {
        Self::new(Payload::EnergyUpdate(update))
    }

    /// Heartbeat request carrying a fresh id for the pong to echo
    pub fn ping() -> Self {
        Self::new(Payload::Ping).with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn pong(id: Option<String>) -> Self {
        Self {
            id,
            ..Self::new(Payload::Pong)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Payload::Error {
            message: message.into(),
        })
    }

    pub fn alert_acknowledged(id: impl Into<String>) -> Self {
        Self::new(Payload::AlertAcknowledged { id: id.into() })
    }

    pub fn kind(&self) -> &str {
        self.payload.kind()
    }

    pub fn is_ping(&self) -> bool {
        matches!(self.payload, Payload::Ping)
    }

    /// The pong answering this envelope, if it is a ping
    pub fn pong_reply(&self) -> Option<Envelope> {
        self.is_ping().then(|| Envelope::pong(self.id.clone()))
    }

    pub fn parse(text: &str) -> Result<Envelope, ProtocolError> {
        let raw: RawEnvelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Envelope::try_from(raw)
    }

    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// What a receiving loop should do with one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Heartbeat; write this pong back immediately and do not forward the ping
    Reply(Envelope),
    /// Application message
    Forward(Envelope),
}

/// Classify an inbound text frame
///
/// Malformed frames are logged and yield `None`; they never end the receiving loop.
pub fn route_inbound(text: &str) -> Option<Inbound> {
    match Envelope::parse(text) {
        Ok(envelope) => Some(match envelope.pong_reply() {
            Some(pong) => Inbound::Reply(pong),
            None => Inbound::Forward(envelope),
        }),
        Err(e) => {
            tracing::error!("dropping inbound frame: {}", e);
            None
        }
    }
}
