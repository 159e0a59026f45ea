//! Channel manager: owns the delivery mode and connection state
//!
//! One manager per watched bot. The manager spawns a driver task that
//! serializes every state transition and callback dispatch; the stream
//! worker and poll loop report to it over an event channel. At most one
//! delivery mode is active at any instant.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::auth::CredentialProvider;
use crate::channel::events::UpdateEnvelope;
use crate::channel::poll::PollLoop;
use crate::channel::stream::{StreamHandle, StreamWorker};
use crate::config::ChannelConfig;
use crate::errors::TransportError;
use crate::transport::{PullTransport, StreamTransport};
use crate::types::{DomainEvent, StatusPayload};

/// Externally observable connection state. Exactly one value holds at
/// any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Error => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Error,
            _ => Self::Disconnected,
        }
    }
}

/// Caller-supplied delivery callbacks. Defaults are no-ops, so a
/// consumer only wires the updates it cares about.
pub struct Subscription {
    on_status: Box<dyn Fn(StatusPayload) + Send + Sync>,
    on_event: Box<dyn Fn(DomainEvent) + Send + Sync>,
    on_error: Box<dyn Fn(&str) + Send + Sync>,
}

impl Subscription {
    pub fn new() -> Self {
        Self {
            on_status: Box::new(|_| {}),
            on_event: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
        }
    }

    pub fn on_status(mut self, callback: impl Fn(StatusPayload) + Send + Sync + 'static) -> Self {
        self.on_status = Box::new(callback);
        self
    }

    pub fn on_event(mut self, callback: impl Fn(DomainEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Box::new(callback);
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Box::new(callback);
        self
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

/// Channel counters exposed for dashboards.
#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    pub updates_received: u64,
    pub reconnect_attempts: u64,
    pub poll_cycles: u64,
    pub connection_errors: u64,
}

/// State shared between the manager facade and its background tasks.
pub(crate) struct ChannelShared {
    status: AtomicU8,
    polling: AtomicBool,
    last_error: RwLock<Option<String>>,
    updates_received: AtomicU64,
    reconnect_attempts: AtomicU64,
    poll_cycles: AtomicU64,
    connection_errors: AtomicU64,
}

impl ChannelShared {
    pub(crate) fn new() -> Self {
        Self {
            status: AtomicU8::new(ConnectionStatus::Disconnected.as_u8()),
            polling: AtomicBool::new(false),
            last_error: RwLock::new(None),
            updates_received: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            poll_cycles: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
        }
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub(crate) fn set_polling(&self, polling: bool) {
        self.polling.store(polling, Ordering::SeqCst);
    }

    pub(crate) fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    pub(crate) fn record_error(&self, message: &str) {
        self.connection_errors.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last_error) = self.last_error.write() {
            *last_error = Some(message.to_string());
        }
    }

    pub(crate) fn clear_error(&self) {
        if let Ok(mut last_error) = self.last_error.write() {
            *last_error = None;
        }
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.last_error.read().ok().and_then(|guard| guard.clone())
    }

    pub(crate) fn note_update(&self) {
        self.updates_received.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn note_reconnect(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn note_poll_cycle(&self) {
        self.poll_cycles.fetch_add(1, Ordering::SeqCst);
    }

    fn stats(&self) -> ChannelStats {
        ChannelStats {
            updates_received: self.updates_received.load(Ordering::SeqCst),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::SeqCst),
            poll_cycles: self.poll_cycles.load(Ordering::SeqCst),
            connection_errors: self.connection_errors.load(Ordering::SeqCst),
        }
    }
}

/// Events reported to the driver by the stream worker and poll loop.
#[derive(Debug)]
pub(crate) enum ChannelEvent {
    StreamOpened,
    Update(UpdateEnvelope),
    /// The stream failed and is scheduling a reconnect
    StreamLost { error: TransportError },
    /// The stream stopped for good
    StreamGaveUp { network_down: bool, message: String },
    /// The server ended the stream with a normal closure
    StreamClosedClean,
    /// The poll loop stopped after exhausting its failure budget
    PollExhausted { message: String },
    /// A delivery path found no credential and stopped
    CredentialMissing,
}

enum ManagerCommand {
    Reconnect,
    Close,
}

/// Per-bot update channel with an explicit open/close lifecycle.
///
/// Public methods never panic and never return errors; all failures
/// surface through [`ChannelManager::status`] and the `on_error`
/// callback.
pub struct ChannelManager {
    config: ChannelConfig,
    shared: Arc<ChannelShared>,
    subscription: Arc<Subscription>,
    credentials: Arc<dyn CredentialProvider>,
    stream_transport: Arc<dyn StreamTransport>,
    pull_transport: Arc<dyn PullTransport>,
    commands: Option<mpsc::UnboundedSender<ManagerCommand>>,
    driver: Option<JoinHandle<()>>,
}

impl ChannelManager {
    pub fn new(
        config: ChannelConfig,
        stream_transport: Arc<dyn StreamTransport>,
        pull_transport: Arc<dyn PullTransport>,
        credentials: Arc<dyn CredentialProvider>,
        subscription: Subscription,
    ) -> Self {
        Self {
            config,
            shared: Arc::new(ChannelShared::new()),
            subscription: Arc::new(subscription),
            credentials,
            stream_transport,
            pull_transport,
            commands: None,
            driver: None,
        }
    }

    /// Begin delivery: stream mode when a credential is present and the
    /// channel is enabled, poll mode when fallback is allowed, otherwise
    /// the channel stays disconnected. Idempotent while open.
    pub fn open(&mut self) {
        if self.driver.is_some() {
            debug!(bot_id = %self.config.entity_id, "Channel already open");
            return;
        }

        info!(bot_id = %self.config.entity_id, "Opening update channel");
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            subscription: Arc::clone(&self.subscription),
            credentials: Arc::clone(&self.credentials),
            stream_transport: Arc::clone(&self.stream_transport),
            pull_transport: Arc::clone(&self.pull_transport),
        };
        self.driver = Some(tokio::spawn(driver.run(command_rx)));
        self.commands = Some(command_tx);
    }

    /// Tear down every delivery path: the stream is closed with the
    /// normal-closure code, the reconnect timer is cancelled and the
    /// poll loop is stopped. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(ManagerCommand::Close);
        }
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
        self.shared.set_polling(false);
        self.shared.set_status(ConnectionStatus::Disconnected);
    }

    /// Re-attempt the stream path from scratch with fresh attempt
    /// counters. Opens the channel if it is not open.
    pub fn reconnect(&mut self) {
        if let Some(commands) = &self.commands {
            if commands.send(ManagerCommand::Reconnect).is_ok() {
                return;
            }
            self.commands = None;
            self.driver = None;
        }
        self.open();
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error()
    }

    /// Whether polling is currently the active delivery mode.
    pub fn is_polling(&self) -> bool {
        self.shared.is_polling()
    }

    pub fn stats(&self) -> ChannelStats {
        self.shared.stats()
    }

    pub fn entity_id(&self) -> &str {
        &self.config.entity_id
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(ManagerCommand::Close);
        }
        if self.driver.is_some() {
            warn!(bot_id = %self.config.entity_id, "Channel dropped without close()");
        }
    }
}

/// Background task that owns the delivery-mode decisions.
struct Driver {
    config: ChannelConfig,
    shared: Arc<ChannelShared>,
    subscription: Arc<Subscription>,
    credentials: Arc<dyn CredentialProvider>,
    stream_transport: Arc<dyn StreamTransport>,
    pull_transport: Arc<dyn PullTransport>,
}

impl Driver {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<ManagerCommand>) {
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let mut poll = PollLoop::new(
            &self.config,
            Arc::clone(&self.pull_transport),
            Arc::clone(&self.credentials),
            Arc::clone(&self.shared),
            event_tx.clone(),
        );
        let mut stream: Option<StreamHandle> = None;

        if self.entitled_for_stream() {
            stream = Some(self.spawn_stream(&event_tx));
        } else if self.config.fallback_enabled {
            info!(bot_id = %self.config.entity_id, "Stream not entitled, starting in poll mode");
            poll.start();
        } else {
            debug!(
                bot_id = %self.config.entity_id,
                "Stream not entitled and fallback disabled, staying disconnected"
            );
        }

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ManagerCommand::Reconnect) => {
                        info!(bot_id = %self.config.entity_id, "Manual reconnect requested");
                        poll.stop();
                        if let Some(handle) = stream.take() {
                            handle.shutdown().await;
                        }
                        if self.entitled_for_stream() {
                            stream = Some(self.spawn_stream(&event_tx));
                        } else if self.config.fallback_enabled {
                            poll.start();
                        }
                    }
                    Some(ManagerCommand::Close) | None => break,
                },
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, &mut poll),
                    None => break,
                },
            }
        }

        poll.stop();
        if let Some(handle) = stream.take() {
            handle.shutdown().await;
        }
        self.shared.set_polling(false);
        self.shared.set_status(ConnectionStatus::Disconnected);
        debug!(bot_id = %self.config.entity_id, "Channel driver stopped");
    }

    fn handle_event(&self, event: ChannelEvent, poll: &mut PollLoop) {
        match event {
            ChannelEvent::StreamOpened => {
                // push wins over pull: stop the fallback before
                // reporting the stream connected
                poll.stop();
                self.shared.clear_error();
                self.shared.set_status(ConnectionStatus::Connected);
                info!(bot_id = %self.config.entity_id, "Stream connected");
            }
            ChannelEvent::Update(envelope) => self.dispatch(envelope),
            ChannelEvent::StreamLost { error } => {
                self.shared.record_error(&error.to_string());
                self.shared.set_status(ConnectionStatus::Error);
                if !error.is_network_class() && self.config.fallback_enabled && !poll.is_active() {
                    info!(bot_id = %self.config.entity_id, "Stream interrupted, starting poll fallback");
                    poll.start();
                }
            }
            ChannelEvent::StreamGaveUp {
                network_down,
                message,
            } => {
                self.shared.record_error(&message);
                if poll.is_active() {
                    // an earlier fallback is already delivering; it
                    // applies its own give-up thresholds from here
                } else if network_down || !self.config.fallback_enabled {
                    self.shared.set_status(ConnectionStatus::Disconnected);
                    (self.subscription.on_error)(&message);
                } else {
                    info!(bot_id = %self.config.entity_id, "Stream exhausted, falling back to polling");
                    poll.start();
                }
            }
            ChannelEvent::StreamClosedClean => {
                self.shared.set_status(ConnectionStatus::Disconnected);
            }
            ChannelEvent::PollExhausted { message } => {
                // the poll loop already stopped itself and set the status
                self.shared.record_error(&message);
                (self.subscription.on_error)(&message);
            }
            ChannelEvent::CredentialMissing => {
                poll.stop();
                self.shared.set_status(ConnectionStatus::Disconnected);
                debug!(bot_id = %self.config.entity_id, "Channel idle: no credential");
            }
        }
    }

    /// Routes a parsed envelope to the matching callback.
    fn dispatch(&self, envelope: UpdateEnvelope) {
        match envelope {
            UpdateEnvelope::Status(payload) => {
                self.shared.note_update();
                (self.subscription.on_status)(payload);
            }
            UpdateEnvelope::Event(event) => {
                self.shared.note_update();
                (self.subscription.on_event)(event);
            }
            UpdateEnvelope::Error { message } => {
                self.shared.record_error(&message);
                (self.subscription.on_error)(&message);
            }
            UpdateEnvelope::KeepAlive => trace!(bot_id = %self.config.entity_id, "keep-alive"),
        }
    }

    fn entitled_for_stream(&self) -> bool {
        self.config.enabled && self.credentials.token().is_some()
    }

    fn spawn_stream(&self, events: &mpsc::UnboundedSender<ChannelEvent>) -> StreamHandle {
        StreamWorker::spawn(
            &self.config,
            Arc::clone(&self.stream_transport),
            Arc::clone(&self.credentials),
            Arc::clone(&self.shared),
            events.clone(),
        )
    }
}
