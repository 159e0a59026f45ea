//! Transport seams consumed by the update channel
//!
//! The channel machinery is written against these traits; production
//! implementations live in [`ws`] (push stream) and [`http`] (pull
//! fetch). Tests substitute scripted implementations.

pub mod http;
pub mod ws;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::types::StatusPayload;

/// Close code for a deliberate, caller-initiated shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// One inbound frame from a stream connection.
#[derive(Debug, Clone)]
pub enum StreamFrame {
    /// A text payload to be parsed as an update envelope
    Text(String),
    /// Transport-level liveness signal (ping/pong)
    KeepAlive,
    /// The peer closed the connection
    Closed { code: u16, reason: String },
}

/// An open push connection delivering frames for a single entity.
#[async_trait]
pub trait StreamConnection: Send {
    /// Next frame; `None` once the connection is finished.
    async fn next_frame(&mut self) -> Option<Result<StreamFrame, TransportError>>;

    /// Send a close frame. Failures are swallowed; the connection is
    /// considered finished either way.
    async fn close(&mut self, code: u16, reason: &str);
}

/// Factory for push connections.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn connect(
        &self,
        entity_id: &str,
        token: &str,
        interval_hint: Duration,
    ) -> Result<Box<dyn StreamConnection>, TransportError>;
}

/// One-shot pull fetch of the current entity status.
#[async_trait]
pub trait PullTransport: Send + Sync {
    async fn fetch_status(
        &self,
        entity_id: &str,
        token: &str,
    ) -> Result<StatusPayload, TransportError>;
}
