//! Live state of one client stream
use super::sink::{EventSink, SinkError};
use crate::models::ClientIdentity;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a connection as driven by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }
}

/// One registered client stream
///
/// The sink is guarded by an async mutex so that payload sends and
/// keep-alives for the same client never interleave on the wire.
pub struct Connection {
    identity: ClientIdentity,
    sink: Mutex<Box<dyn EventSink>>,
    created_at: DateTime<Utc>,
    opened_at: Instant,
    received: AtomicU64,
    state: AtomicU8,
    disposed: AtomicBool,
    closed: CancellationToken,
    activity: Notify,
}

impl Connection {
    pub fn new(identity: ClientIdentity, sink: Box<dyn EventSink>) -> Arc<Self> {
        Arc::new(Self {
            identity,
            sink: Mutex::new(sink),
            created_at: Utc::now(),
            opened_at: Instant::now(),
            received: AtomicU64::new(0),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            disposed: AtomicBool::new(false),
            closed: CancellationToken::new(),
            activity: Notify::new(),
        })
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Frames successfully written to this stream
    pub fn received_count(&self) -> u64 {
        self.received.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the stream has been disposed
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Resolves after the next successful delivery
    pub(crate) async fn delivered(&self) {
        self.activity.notified().await
    }

    /// Write one frame, giving up as soon as the connection is closed
    pub(crate) async fn write_frame(&self, frame: &str) -> Result<(), SinkError> {
        let mut sink = self.sink.lock().await;
        if self.is_closed() {
            return Err(SinkError::Closed);
        }

        tokio::select! {
            result = sink.write_frame(frame) => result,
            _ = self.closed.cancelled() => Err(SinkError::Closed),
        }
    }

    pub(crate) fn record_delivery(&self) {
        self.received.fetch_add(1, Ordering::AcqRel);
        self.activity.notify_one();
    }

    /// Dispose the stream
    ///
    /// Returns `true` only for the call that actually closed it.
    pub async fn close(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }

        // Cancel first so a stalled writer releases the sink
        self.closed.cancel();
        self.sink.lock().await.close().await;
        true
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity)
            .field("created_at", &self.created_at)
            .field("received", &self.received_count())
            .field("state", &self.state())
            .finish()
    }
}
