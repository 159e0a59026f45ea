//! Per-bot channel registry for a dashboard session

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::auth::CredentialProvider;
use crate::channel::manager::{ChannelManager, ConnectionStatus, Subscription};
use crate::config::ChannelConfig;
use crate::transport::{PullTransport, StreamTransport};

/// Owns one open channel per watched bot. Watching an id that is
/// already watched tears the previous channel down before the new one
/// opens, so timers and sockets never leak across instances.
pub struct ChannelRegistry {
    stream_transport: Arc<dyn StreamTransport>,
    pull_transport: Arc<dyn PullTransport>,
    credentials: Arc<dyn CredentialProvider>,
    channels: DashMap<String, ChannelManager>,
}

impl ChannelRegistry {
    pub fn new(
        stream_transport: Arc<dyn StreamTransport>,
        pull_transport: Arc<dyn PullTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            stream_transport,
            pull_transport,
            credentials,
            channels: DashMap::new(),
        }
    }

    /// Opens a channel for `config.entity_id`, replacing and fully
    /// closing any previous channel for that id first.
    pub async fn watch(&self, config: ChannelConfig, subscription: Subscription) {
        let entity_id = config.entity_id.clone();
        if let Some((_, mut previous)) = self.channels.remove(&entity_id) {
            debug!(bot_id = %entity_id, "Replacing existing channel");
            previous.close().await;
        }

        let mut manager = ChannelManager::new(
            config,
            Arc::clone(&self.stream_transport),
            Arc::clone(&self.pull_transport),
            Arc::clone(&self.credentials),
            subscription,
        );
        manager.open();
        self.channels.insert(entity_id, manager);
    }

    /// Closes and removes the channel for `entity_id`, if any.
    pub async fn unwatch(&self, entity_id: &str) {
        if let Some((_, mut manager)) = self.channels.remove(entity_id) {
            info!(bot_id = %entity_id, "Unwatching bot");
            manager.close().await;
        }
    }

    pub fn is_watching(&self, entity_id: &str) -> bool {
        self.channels.contains_key(entity_id)
    }

    pub fn status(&self, entity_id: &str) -> Option<ConnectionStatus> {
        self.channels.get(entity_id).map(|entry| entry.status())
    }

    pub fn is_polling(&self, entity_id: &str) -> Option<bool> {
        self.channels.get(entity_id).map(|entry| entry.is_polling())
    }

    pub fn last_error(&self, entity_id: &str) -> Option<String> {
        self.channels
            .get(entity_id)
            .and_then(|entry| entry.last_error())
    }

    /// Re-attempts the stream path for `entity_id`. Returns false when
    /// the bot is not watched.
    pub fn reconnect(&self, entity_id: &str) -> bool {
        match self.channels.get_mut(entity_id) {
            Some(mut entry) => {
                entry.reconnect();
                true
            }
            None => false,
        }
    }

    /// Tears down every channel; used on session shutdown.
    pub async fn close_all(&self) {
        let entity_ids: Vec<String> = self
            .channels
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for entity_id in entity_ids {
            self.unwatch(&entity_id).await;
        }
    }
}
