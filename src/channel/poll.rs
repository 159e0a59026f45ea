//! Pull-based poll loop used when the stream is unavailable

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::auth::CredentialProvider;
use crate::channel::backoff::{FailurePolicy, FailureStreak};
use crate::channel::events::UpdateEnvelope;
use crate::channel::manager::{ChannelEvent, ChannelShared, ConnectionStatus};
use crate::config::ChannelConfig;
use crate::transport::PullTransport;

/// Periodic status fetcher. One instance per channel, started and
/// stopped by the manager's driver task.
pub(crate) struct PollLoop {
    entity_id: String,
    poll_interval: Duration,
    policy: FailurePolicy,
    transport: Arc<dyn PullTransport>,
    credentials: Arc<dyn CredentialProvider>,
    shared: Arc<ChannelShared>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    task: Option<JoinHandle<()>>,
}

impl PollLoop {
    pub(crate) fn new(
        config: &ChannelConfig,
        transport: Arc<dyn PullTransport>,
        credentials: Arc<dyn CredentialProvider>,
        shared: Arc<ChannelShared>,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self {
            entity_id: config.entity_id.clone(),
            poll_interval: config.poll_interval,
            policy: FailurePolicy::new(config.max_poll_failures),
            transport,
            credentials,
            shared,
            events,
            task: None,
        }
    }

    /// Idempotent: a second `start()` while running is a no-op, so no
    /// duplicate timers can exist. The first poll fires immediately.
    pub(crate) fn start(&mut self) {
        if self.is_active() {
            debug!(bot_id = %self.entity_id, "Poll loop already running");
            return;
        }

        info!(
            bot_id = %self.entity_id,
            interval = ?self.poll_interval,
            "Starting poll loop"
        );
        self.shared.set_polling(true);

        let entity_id = self.entity_id.clone();
        let poll_interval = self.poll_interval;
        let policy = self.policy;
        let transport = Arc::clone(&self.transport);
        let credentials = Arc::clone(&self.credentials);
        let shared = Arc::clone(&self.shared);
        let events = self.events.clone();

        self.task = Some(tokio::spawn(async move {
            let mut streak = FailureStreak::new();
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                // first tick completes immediately
                ticker.tick().await;

                let Some(token) = credentials.token() else {
                    debug!(bot_id = %entity_id, "No credential, poll loop stopping");
                    let _ = events.send(ChannelEvent::CredentialMissing);
                    break;
                };

                shared.note_poll_cycle();
                match transport.fetch_status(&entity_id, &token).await {
                    Ok(payload) => {
                        streak.reset();
                        shared.set_status(ConnectionStatus::Connected);
                        let _ = events.send(ChannelEvent::Update(UpdateEnvelope::Status(payload)));
                    }
                    Err(error) => {
                        let failures = streak.record();
                        let network_class = error.is_network_class();
                        warn!(
                            bot_id = %entity_id,
                            %error,
                            failures,
                            network_class,
                            "Status poll failed"
                        );
                        if policy.should_stop(failures, network_class) {
                            shared.set_status(ConnectionStatus::Disconnected);
                            let _ = events.send(ChannelEvent::PollExhausted {
                                message: format!(
                                    "status polling stopped after {failures} consecutive failures: {error}"
                                ),
                            });
                            break;
                        }
                    }
                }
            }

            shared.set_polling(false);
        }));
    }

    pub(crate) fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Idempotent; safe to call when not running. Aborting the task
    /// also cancels any in-flight fetch.
    pub(crate) fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(bot_id = %self.entity_id, "Poll loop stopped");
        }
        self.shared.set_polling(false);
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
