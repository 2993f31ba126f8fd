//! WebSocket message types
//!
//! Every frame in either direction is a JSON object `{"type": .., "message": ..}`.
//! Only `CONN` and `PING` mean something to the relay on the way in; any other
//! `type` (including a client-sent `PONG` or `LIST`) is passed through opaquely.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

pub const TYPE_CONN: &str = "CONN";
pub const TYPE_PING: &str = "PING";
pub const TYPE_PONG: &str = "PONG";
pub const TYPE_LIST: &str = "LIST";

/// Payload of every PONG reply
pub const PONG_PAYLOAD: &str = "PONG!";

/// One row of the terminal directory, on the wire as `[label, token]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, Option<String>)", into = "(String, Option<String>)")]
pub struct DirectoryEntry {
    pub label: String,
    pub token: Option<String>,
}

impl DirectoryEntry {
    pub fn new(label: impl Into<String>, token: Option<String>) -> Self {
        Self {
            label: label.into(),
            token,
        }
    }
}

impl From<(String, Option<String>)> for DirectoryEntry {
    fn from((label, token): (String, Option<String>)) -> Self {
        Self { label, token }
    }
}

impl From<DirectoryEntry> for (String, Option<String>) {
    fn from(entry: DirectoryEntry) -> Self {
        (entry.label, entry.token)
    }
}

/// A decoded relay frame
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Client sets its pairing token (`None` clears it)
    Conn(Option<String>),
    /// Client liveness probe
    Ping,
    /// Server reply to `Ping`
    Pong(String),
    /// Server push of the terminal directory
    List(Vec<DirectoryEntry>),
    /// Anything else, relayed unchanged between paired peers
    ///
    /// `payload` is `None` when the frame had no `message` key at all, which
    /// is different from an explicit `"message": null`.
    Data {
        kind: String,
        payload: Option<Value>,
    },
}

/// Inbound wire shape, before the `type` is interpreted
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, deserialize_with = "present")]
    message: Option<Value>,
}

/// Outbound wire shape
#[derive(Debug, Serialize)]
struct OutboundFrame<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<T>,
}

/// Keeps an explicit `null` as `Some(Value::Null)`; only a missing key is `None`
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    /// Decode a client frame
    ///
    /// Fails with [`RelayError::MalformedMessage`] unless the text is a JSON
    /// object carrying a string `type`.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| RelayError::MalformedMessage(e.to_string()))?;
        if !value.is_object() {
            return Err(RelayError::MalformedMessage(
                "frame is not a JSON object".to_string(),
            ));
        }
        let frame: InboundFrame =
            serde_json::from_value(value).map_err(|e| RelayError::MalformedMessage(e.to_string()))?;

        Ok(match frame.kind.as_str() {
            TYPE_CONN => Envelope::Conn(frame.message.and_then(token_from_payload)),
            TYPE_PING => Envelope::Ping,
            _ => Envelope::Data {
                kind: frame.kind,
                payload: frame.message,
            },
        })
    }

    /// The `type` string this envelope carries on the wire
    pub fn kind(&self) -> &str {
        match self {
            Envelope::Conn(_) => TYPE_CONN,
            Envelope::Ping => TYPE_PING,
            Envelope::Pong(_) => TYPE_PONG,
            Envelope::List(_) => TYPE_LIST,
            Envelope::Data { kind, .. } => kind,
        }
    }

    /// Encode as a text frame
    pub fn to_frame(&self) -> Result<String> {
        let kind = self.kind();
        let frame = match self {
            Envelope::Conn(token) => serde_json::to_string(&OutboundFrame {
                kind,
                message: Some(token),
            })?,
            Envelope::Ping => serde_json::to_string(&OutboundFrame {
                kind,
                message: Some(TYPE_PING),
            })?,
            Envelope::Pong(text) => serde_json::to_string(&OutboundFrame {
                kind,
                message: Some(text),
            })?,
            Envelope::List(entries) => serde_json::to_string(&OutboundFrame {
                kind,
                message: Some(entries),
            })?,
            Envelope::Data { payload, .. } => serde_json::to_string(&OutboundFrame {
                kind,
                message: payload.as_ref(),
            })?,
        };
        Ok(frame)
    }

    /// The standard reply to a `PING`
    pub fn pong() -> Self {
        Envelope::Pong(PONG_PAYLOAD.to_string())
    }
}

/// A `CONN` payload is an opaque token: strings are kept verbatim, `null`
/// clears the token, other JSON values keep their compact text form
fn token_from_payload(payload: Value) -> Option<String> {
    match payload {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
