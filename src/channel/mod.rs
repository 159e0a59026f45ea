//! Resilient real-time update channel
//!
//! This module provides:
//! - A per-bot channel manager with an explicit open/close lifecycle
//! - A push-based stream client with bounded linear reconnection
//! - A pull-based poll loop used when the stream is unavailable
//! - Shared backoff/give-up policy for both delivery modes
//! - A registry holding one open channel per watched bot

pub mod backoff;
pub mod events;
pub mod manager;
pub mod poll;
pub mod registry;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::{FailurePolicy, FailureStreak, ReconnectPolicy, NETWORK_FAILURE_LIMIT};
pub use events::{parse_frame, EventError, UpdateEnvelope};
pub use manager::{ChannelManager, ChannelStats, ConnectionStatus, Subscription};
pub use registry::ChannelRegistry;
