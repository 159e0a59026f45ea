//! Wire envelope parsing for stream and poll payloads

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::types::{DomainEvent, StatusPayload};

#[derive(Error, Debug)]
pub enum EventError {
    #[error("invalid message format: {0}")]
    InvalidFormat(#[from] serde_json::Error),
}

/// Parsed update delivered to subscribers. Both delivery modes produce
/// these, so consumers never see which mode is active.
#[derive(Debug, Clone)]
pub enum UpdateEnvelope {
    Status(StatusPayload),
    Event(DomainEvent),
    /// Server-reported error envelope
    Error { message: String },
    /// Liveness signal; produces no callback
    KeepAlive,
}

/// Raw message envelope: a tag plus the remaining fields.
#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(rename = "type", alias = "event_type")]
    tag: String,
    #[serde(flatten)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: String,
}

/// Parse one inbound text frame. Unknown tags are logged and dropped
/// (`Ok(None)`), never fatal.
pub fn parse_frame(text: &str) -> Result<Option<UpdateEnvelope>, EventError> {
    let message: WireMessage = serde_json::from_str(text)?;
    let envelope = match message.tag.as_str() {
        "status" => UpdateEnvelope::Status(serde_json::from_value(message.data)?),
        "trade" => {
            UpdateEnvelope::Event(DomainEvent::Trade(serde_json::from_value(message.data)?))
        }
        "position" => {
            UpdateEnvelope::Event(DomainEvent::Position(serde_json::from_value(message.data)?))
        }
        "metric" => {
            UpdateEnvelope::Event(DomainEvent::Metric(serde_json::from_value(message.data)?))
        }
        "error" => {
            let body: ErrorBody = serde_json::from_value(message.data)?;
            UpdateEnvelope::Error {
                message: body.message,
            }
        }
        "ping" | "keep_alive" => UpdateEnvelope::KeepAlive,
        other => {
            warn!(tag = %other, "Dropping message with unknown tag");
            return Ok(None);
        }
    };
    Ok(Some(envelope))
}
