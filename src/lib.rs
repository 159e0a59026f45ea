pub mod auth;
pub mod channel;
pub mod config;
pub mod errors;
pub mod logging;
pub mod transport;
pub mod types;

// Re-export the channel surface consumed by the dashboard layer
pub use channel::{ChannelManager, ChannelRegistry, ConnectionStatus, Subscription};
