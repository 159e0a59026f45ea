//! Scripted transports and callback collectors shared by channel tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::channel::manager::Subscription;
use crate::errors::TransportError;
use crate::transport::{PullTransport, StreamConnection, StreamFrame, StreamTransport};
use crate::types::{DomainEvent, StatusPayload};

pub(crate) fn status_payload(bot_id: &str) -> StatusPayload {
    StatusPayload {
        bot_id: bot_id.to_string(),
        state: "running".to_string(),
        equity: None,
        open_positions: None,
        metrics: serde_json::Value::Null,
        updated_at: None,
    }
}

pub(crate) fn status_frame(bot_id: &str) -> StreamFrame {
    StreamFrame::Text(format!(
        r#"{{"type":"status","bot_id":"{bot_id}","state":"running"}}"#
    ))
}

/// Pull transport replaying a scripted sequence of results; once the
/// script runs dry it keeps answering with the configured default.
pub(crate) struct ScriptedPull {
    script: Mutex<VecDeque<Result<StatusPayload, TransportError>>>,
    calls: AtomicUsize,
    default_ok: bool,
}

impl ScriptedPull {
    pub(crate) fn new(script: Vec<Result<StatusPayload, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
            default_ok: false,
        })
    }

    pub(crate) fn always_ok() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            default_ok: true,
        })
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PullTransport for ScriptedPull {
    async fn fetch_status(
        &self,
        entity_id: &str,
        _token: &str,
    ) -> Result<StatusPayload, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().expect("script lock").pop_front();
        match scripted {
            Some(result) => result,
            None if self.default_ok => Ok(status_payload(entity_id)),
            None => Err(TransportError::Http { status: 503 }),
        }
    }
}

/// One scripted connect outcome.
pub(crate) enum ConnectScript {
    /// Connection opens and yields these frames, then stays open
    Open(Vec<Result<StreamFrame, TransportError>>),
    /// Connect attempt fails
    Fail(TransportError),
}

pub(crate) struct ScriptedStream {
    script: Mutex<VecDeque<ConnectScript>>,
    connects: AtomicUsize,
    open: Arc<AtomicBool>,
    closes: Arc<Mutex<Vec<(u16, String)>>>,
}

impl ScriptedStream {
    pub(crate) fn new(script: Vec<ConnectScript>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            connects: AtomicUsize::new(0),
            open: Arc::new(AtomicBool::new(false)),
            closes: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Whether a scripted connection is currently open.
    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Close frames sent by the client side.
    pub(crate) fn closes(&self) -> Vec<(u16, String)> {
        self.closes.lock().expect("closes lock").clone()
    }
}

#[async_trait]
impl StreamTransport for ScriptedStream {
    async fn connect(
        &self,
        _entity_id: &str,
        _token: &str,
        _interval_hint: Duration,
    ) -> Result<Box<dyn StreamConnection>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().expect("script lock").pop_front();
        match scripted {
            Some(ConnectScript::Open(frames)) => {
                self.open.store(true, Ordering::SeqCst);
                Ok(Box::new(ScriptedConnection {
                    frames: frames.into_iter().collect(),
                    open: Arc::clone(&self.open),
                    closes: Arc::clone(&self.closes),
                }))
            }
            Some(ConnectScript::Fail(error)) => Err(error),
            None => Err(TransportError::Unreachable(
                "connect script exhausted".to_string(),
            )),
        }
    }
}

struct ScriptedConnection {
    frames: VecDeque<Result<StreamFrame, TransportError>>,
    open: Arc<AtomicBool>,
    closes: Arc<Mutex<Vec<(u16, String)>>>,
}

#[async_trait]
impl StreamConnection for ScriptedConnection {
    async fn next_frame(&mut self) -> Option<Result<StreamFrame, TransportError>> {
        match self.frames.pop_front() {
            Some(frame) => {
                let finished = matches!(frame, Ok(StreamFrame::Closed { .. }) | Err(_));
                if finished {
                    self.open.store(false, Ordering::SeqCst);
                }
                Some(frame)
            }
            // script exhausted: connection stays open until closed
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self, code: u16, reason: &str) {
        self.open.store(false, Ordering::SeqCst);
        self.closes
            .lock()
            .expect("closes lock")
            .push((code, reason.to_string()));
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Records every callback invocation.
#[derive(Default)]
pub(crate) struct Collector {
    statuses: Mutex<Vec<StatusPayload>>,
    events: Mutex<Vec<DomainEvent>>,
    errors: Mutex<Vec<String>>,
}

impl Collector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn subscription(self: &Arc<Self>) -> Subscription {
        let statuses = Arc::clone(self);
        let events = Arc::clone(self);
        let errors = Arc::clone(self);
        Subscription::new()
            .on_status(move |payload| {
                statuses.statuses.lock().expect("statuses lock").push(payload);
            })
            .on_event(move |event| {
                events.events.lock().expect("events lock").push(event);
            })
            .on_error(move |message| {
                errors
                    .errors
                    .lock()
                    .expect("errors lock")
                    .push(message.to_string());
            })
    }

    pub(crate) fn status_count(&self) -> usize {
        self.statuses.lock().expect("statuses lock").len()
    }

    pub(crate) fn event_count(&self) -> usize {
        self.events.lock().expect("events lock").len()
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("errors lock").clone()
    }

    pub(crate) fn error_count(&self) -> usize {
        self.errors.lock().expect("errors lock").len()
    }
}

/// Polls `condition` under virtual time until it holds or a bounded
/// number of 10 ms waits has elapsed.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Samples a condition that must hold outside mode handovers. The
/// manager stops the alternate mode "immediately upon" activating the
/// new one, so a violation observed mid-turn gets a few schedule-only
/// yields (no time advance) to clear before it counts.
pub(crate) async fn holds_outside_handover(mut condition: impl FnMut() -> bool) -> bool {
    if condition() {
        return true;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
        if condition() {
            return true;
        }
    }
    false
}
