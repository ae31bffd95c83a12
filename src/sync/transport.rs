//! # Backend Transport
//!
//! The seam between the sync core and whatever pushes change notifications
//! from the backend. The core never owns a socket; it is handed a
//! [`Transport`] implementation plus a frame stream, which keeps the whole
//! coordination layer testable without a backend.
//!
//! Delivery contract assumed of implementations: best-effort while
//! connected, nothing while disconnected, no replay on reconnect. The
//! reconnection manager compensates with a full resync.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

use super::errors::{SyncError, SyncResult};
use super::event::{ChangeEvent, SubscriptionKey};

/// Connection state of the transport, process-wide per connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Events are flowing
    Connected,
    /// Transport dropped; backoff retries in progress
    Reconnecting,
    /// Repeated reconnect failures; surfaced so the UI can show a banner
    Degraded,
}

impl ConnectionState {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Reconnecting => "RECONNECTING",
            ConnectionState::Degraded => "DEGRADED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of transport input to the dispatch loop
#[derive(Debug, Clone)]
pub enum TransportFrame {
    /// A raw change notification, not yet decoded
    Event(Value),
    /// The connection dropped; no events arrive until reconnected
    Disconnected,
}

/// Receiver half of the transport frame stream
pub type FrameReceiver = mpsc::UnboundedReceiver<TransportFrame>;

/// Sender half of the transport frame stream
pub type FrameSender = mpsc::UnboundedSender<TransportFrame>;

/// Control surface of a backend transport.
///
/// `open`/`close` manage server-side table subscriptions and are called by
/// the multiplexer as reference counts cross zero. `reconnect` must
/// re-establish the connection *and* restore every subscription still open.
pub trait Transport: Send + Sync {
    /// Open a backend subscription for one `(table, predicate)` pair
    fn open(&self, key: &SubscriptionKey) -> SyncResult<()>;

    /// Close a backend subscription; must not fail
    fn close(&self, key: &SubscriptionKey);

    /// Attempt one reconnect, restoring open subscriptions on success
    fn reconnect(&self) -> SyncResult<()>;
}

/// In-process transport for tests and local development.
///
/// Frames are injected by hand; reconnect attempts can be programmed to
/// fail a given number of times to exercise backoff and degradation.
pub struct FakeTransport {
    frames: FrameSender,
    open_counts: Mutex<HashMap<SubscriptionKey, usize>>,
    opens_total: AtomicUsize,
    closes_total: AtomicUsize,
    reconnect_calls: AtomicUsize,
    fail_reconnects: AtomicUsize,
}

impl FakeTransport {
    /// Create a fake transport and the frame stream the dispatch loop consumes
    pub fn new() -> (Arc<Self>, FrameReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            frames: tx,
            open_counts: Mutex::new(HashMap::new()),
            opens_total: AtomicUsize::new(0),
            closes_total: AtomicUsize::new(0),
            reconnect_calls: AtomicUsize::new(0),
            fail_reconnects: AtomicUsize::new(0),
        });
        (transport, rx)
    }

    /// Deliver a change event
    pub fn push(&self, event: &ChangeEvent) {
        if let Ok(raw) = serde_json::to_value(event) {
            let _ = self.frames.send(TransportFrame::Event(raw));
        }
    }

    /// Deliver an arbitrary raw frame (for malformed-event tests)
    pub fn push_raw(&self, raw: Value) {
        let _ = self.frames.send(TransportFrame::Event(raw));
    }

    /// Simulate a connection drop
    pub fn drop_connection(&self) {
        let _ = self.frames.send(TransportFrame::Disconnected);
    }

    /// Make the next `n` reconnect attempts fail
    pub fn fail_next_reconnects(&self, n: usize) {
        self.fail_reconnects.store(n, Ordering::SeqCst);
    }

    /// How many subscriptions are currently open for `key`
    pub fn open_count(&self, key: &SubscriptionKey) -> usize {
        self.open_counts
            .lock()
            .map(|m| m.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total `open` calls observed
    pub fn opens_total(&self) -> usize {
        self.opens_total.load(Ordering::SeqCst)
    }

    /// Total `close` calls observed
    pub fn closes_total(&self) -> usize {
        self.closes_total.load(Ordering::SeqCst)
    }

    /// Total `reconnect` calls observed
    pub fn reconnect_calls(&self) -> usize {
        self.reconnect_calls.load(Ordering::SeqCst)
    }
}

impl Transport for FakeTransport {
    fn open(&self, key: &SubscriptionKey) -> SyncResult<()> {
        self.opens_total.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut counts) = self.open_counts.lock() {
            *counts.entry(key.clone()).or_insert(0) += 1;
        }
        Ok(())
    }

    fn close(&self, key: &SubscriptionKey) {
        self.closes_total.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut counts) = self.open_counts.lock() {
            if let Some(count) = counts.get_mut(key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.remove(key);
                }
            }
        }
    }

    fn reconnect(&self) -> SyncResult<()> {
        self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_reconnects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_reconnects.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::transport("simulated reconnect failure"));
        }
        Ok(())
    }
}
