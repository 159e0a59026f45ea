//! Push-based stream client with bounded linear reconnection

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::auth::CredentialProvider;
use crate::channel::backoff::{FailureStreak, ReconnectPolicy, NETWORK_FAILURE_LIMIT};
use crate::channel::events::{parse_frame, UpdateEnvelope};
use crate::channel::manager::{ChannelEvent, ChannelShared, ConnectionStatus};
use crate::config::ChannelConfig;
use crate::errors::TransportError;
use crate::transport::{StreamFrame, StreamTransport, CLOSE_ABNORMAL, CLOSE_NORMAL};

/// Handle to a running stream worker task.
pub(crate) struct StreamHandle {
    task: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

impl StreamHandle {
    /// Signals the worker and waits for it to wind down; the connection
    /// is closed with the normal-closure code on the way out.
    pub(crate) async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}

/// Outcome of one connect-and-read cycle.
enum CycleEnd {
    /// The peer closed with a normal code
    CleanClose,
    /// The caller asked us to stop
    Shutdown,
    /// Transport failed; reconnect may follow
    Failed(TransportError),
}

pub(crate) struct StreamWorker {
    entity_id: String,
    interval_hint: Duration,
    policy: ReconnectPolicy,
    transport: Arc<dyn StreamTransport>,
    credentials: Arc<dyn CredentialProvider>,
    shared: Arc<ChannelShared>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl StreamWorker {
    pub(crate) fn spawn(
        config: &ChannelConfig,
        transport: Arc<dyn StreamTransport>,
        credentials: Arc<dyn CredentialProvider>,
        shared: Arc<ChannelShared>,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> StreamHandle {
        let worker = Self {
            entity_id: config.entity_id.clone(),
            interval_hint: config.update_interval,
            policy: ReconnectPolicy::new(
                config.base_reconnect_delay,
                config.max_reconnect_attempts,
            ),
            transport,
            credentials,
            shared,
            events,
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(worker.run(shutdown_rx));
        StreamHandle {
            task,
            shutdown: shutdown_tx,
        }
    }

    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut attempt: u32 = 0;
        let mut network_streak = FailureStreak::new();

        loop {
            let Some(token) = self.credentials.token() else {
                debug!(bot_id = %self.entity_id, "No credential for stream, stopping");
                let _ = self.events.send(ChannelEvent::CredentialMissing);
                return;
            };

            self.shared.set_status(ConnectionStatus::Connecting);
            let error = match self
                .connect_and_read(&token, &mut attempt, &mut network_streak, &mut shutdown)
                .await
            {
                CycleEnd::Shutdown => {
                    debug!(bot_id = %self.entity_id, "Stream worker shut down");
                    return;
                }
                CycleEnd::CleanClose => {
                    info!(bot_id = %self.entity_id, "Stream closed cleanly by server");
                    let _ = self.events.send(ChannelEvent::StreamClosedClean);
                    return;
                }
                CycleEnd::Failed(error) => error,
            };

            if error.is_network_class() {
                let streak = network_streak.record();
                if streak >= NETWORK_FAILURE_LIMIT {
                    warn!(bot_id = %self.entity_id, %error, "Server unreachable, giving up on stream");
                    let _ = self.events.send(ChannelEvent::StreamGaveUp {
                        network_down: true,
                        message: format!("server unreachable: {error}"),
                    });
                    return;
                }
            } else {
                network_streak.reset();
            }

            if self.policy.attempts_exhausted(attempt) {
                warn!(
                    bot_id = %self.entity_id,
                    attempts = attempt,
                    %error,
                    "Stream reconnect attempts exhausted"
                );
                let _ = self.events.send(ChannelEvent::StreamGaveUp {
                    network_down: false,
                    message: format!("stream reconnect attempts exhausted: {error}"),
                });
                return;
            }

            let _ = self.events.send(ChannelEvent::StreamLost { error });

            attempt += 1;
            self.shared.note_reconnect();
            let delay = self.policy.delay_for(attempt);
            debug!(bot_id = %self.entity_id, attempt, ?delay, "Scheduling stream reconnect");
            tokio::select! {
                _ = sleep(delay) => {}
                _ = &mut shutdown => {
                    debug!(bot_id = %self.entity_id, "Shutdown during reconnect wait");
                    return;
                }
            }
        }
    }

    /// One connection lifetime: connect, announce the open, then pump
    /// frames until the connection ends or shutdown is requested.
    async fn connect_and_read(
        &self,
        token: &str,
        attempt: &mut u32,
        network_streak: &mut FailureStreak,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> CycleEnd {
        let mut connection = tokio::select! {
            result = self
                .transport
                .connect(&self.entity_id, token, self.interval_hint) =>
            {
                match result {
                    Ok(connection) => connection,
                    Err(error) => return CycleEnd::Failed(error),
                }
            }
            _ = &mut *shutdown => return CycleEnd::Shutdown,
        };

        *attempt = 0;
        network_streak.reset();
        let _ = self.events.send(ChannelEvent::StreamOpened);

        loop {
            tokio::select! {
                frame = connection.next_frame() => match frame {
                    Some(Ok(StreamFrame::Text(text))) => match parse_frame(&text) {
                        Ok(Some(envelope)) => {
                            let _ = self.events.send(ChannelEvent::Update(envelope));
                        }
                        Ok(None) => {}
                        Err(error) => {
                            warn!(bot_id = %self.entity_id, %error, "Discarding malformed stream message");
                            let _ = self.events.send(ChannelEvent::Update(UpdateEnvelope::Error {
                                message: format!("malformed update: {error}"),
                            }));
                        }
                    },
                    Some(Ok(StreamFrame::KeepAlive)) => {
                        debug!(bot_id = %self.entity_id, "Stream keep-alive");
                    }
                    Some(Ok(StreamFrame::Closed { code, reason })) => {
                        return if code == CLOSE_NORMAL {
                            CycleEnd::CleanClose
                        } else {
                            CycleEnd::Failed(TransportError::StreamClosed { code, reason })
                        };
                    }
                    Some(Err(error)) => return CycleEnd::Failed(error),
                    None => {
                        return CycleEnd::Failed(TransportError::StreamClosed {
                            code: CLOSE_ABNORMAL,
                            reason: "stream ended".to_string(),
                        });
                    }
                },
                _ = &mut *shutdown => {
                    connection.close(CLOSE_NORMAL, "client closing").await;
                    return CycleEnd::Shutdown;
                }
            }
        }
    }
}
