//! Channel configuration and endpoint resolution

use std::time::Duration;
use url::Url;

/// Per-channel configuration, fixed for the lifetime of a manager.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Bot identifier this channel monitors
    pub entity_id: String,
    /// Whether live streaming is enabled for this channel
    pub enabled: bool,
    /// Desired push-update interval hint forwarded to the stream endpoint
    pub update_interval: Duration,
    /// Interval between pull fetches in fallback mode
    pub poll_interval: Duration,
    /// Whether to fall back to polling when the stream is unavailable
    pub fallback_enabled: bool,
    /// Maximum stream reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Base reconnect delay; attempt N waits `base * N`
    pub base_reconnect_delay: Duration,
    /// Consecutive poll failures tolerated before the loop stops
    pub max_poll_failures: u32,
}

impl ChannelConfig {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            enabled: true,
            update_interval: Duration::from_secs(2),
            poll_interval: Duration::from_secs(5),
            fallback_enabled: true,
            max_reconnect_attempts: 5,
            base_reconnect_delay: Duration::from_secs(3),
            max_poll_failures: 3,
        }
    }
}

/// Base addresses for the dashboard backend, resolved once per process.
#[derive(Debug, Clone)]
pub struct Endpoints {
    api_base: String,
    stream_base: String,
}

impl Endpoints {
    /// Validates both bases up front; trailing slashes are normalized away.
    pub fn new(api_base: &str, stream_base: &str) -> Result<Self, url::ParseError> {
        Url::parse(api_base)?;
        Url::parse(stream_base)?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            stream_base: stream_base.trim_end_matches('/').to_string(),
        })
    }

    /// REST URL for a one-shot status fetch.
    pub fn status_url(&self, entity_id: &str) -> String {
        format!("{}/bots/{}/status", self.api_base, entity_id)
    }

    /// WebSocket URL for the live update stream. Carries the auth token
    /// and the desired push interval as query parameters.
    pub fn stream_url(
        &self,
        entity_id: &str,
        token: &str,
        interval_hint: Duration,
    ) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}/bots/{}/stream", self.stream_base, entity_id))?;
        url.query_pairs_mut()
            .append_pair("token", token)
            .append_pair("interval_ms", &interval_hint.as_millis().to_string());
        Ok(url)
    }
}
