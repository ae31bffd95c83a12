//! Metrics registry for the sync core.
//!
//! Counters only, monotonic, reset on process start. All counters use
//! relaxed atomics; exact cross-counter consistency is not required for
//! diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one sync session
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Raw frames received from the transport
    events_received: AtomicU64,
    /// Frames dropped because they failed to decode
    events_malformed: AtomicU64,
    /// Event-to-channel routings (one event may route to several channels)
    events_routed: AtomicU64,
    /// Valid events that matched no live channel
    events_unrouted: AtomicU64,
    /// Channel callbacks invoked
    callbacks_fired: AtomicU64,
    /// Channel callbacks that returned an error or panicked
    callback_errors: AtomicU64,
    /// Reconnect attempts made
    reconnect_attempts: AtomicU64,
    /// Successful reconnects
    reconnects: AtomicU64,
    /// Full resyncs performed after a reconnect
    full_resyncs: AtomicU64,
    /// Cache reads served fresh
    cache_hits: AtomicU64,
    /// Cache reads served stale (stale-while-revalidate)
    cache_stale_hits: AtomicU64,
    /// Cache reads that missed
    cache_misses: AtomicU64,
    /// Cache entries marked stale or evicted by invalidation
    cache_invalidations: AtomicU64,
}

impl MetricsRegistry {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment raw frames received
    pub fn incr_events_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment malformed frames
    pub fn incr_events_malformed(&self) {
        self.events_malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` event-to-channel routings
    pub fn add_events_routed(&self, n: u64) {
        self.events_routed.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment events that matched no channel
    pub fn incr_events_unrouted(&self) {
        self.events_unrouted.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment callbacks fired
    pub fn incr_callbacks_fired(&self) {
        self.callbacks_fired.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment failed callbacks
    pub fn incr_callback_errors(&self) {
        self.callback_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment reconnect attempts
    pub fn incr_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment successful reconnects
    pub fn incr_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment full resyncs
    pub fn incr_full_resyncs(&self) {
        self.full_resyncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment fresh cache hits
    pub fn incr_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment stale cache hits
    pub fn incr_cache_stale_hits(&self) {
        self.cache_stale_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment cache misses
    pub fn incr_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` invalidated cache entries
    pub fn add_cache_invalidations(&self, n: u64) {
        self.cache_invalidations.fetch_add(n, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_malformed: self.events_malformed.load(Ordering::Relaxed),
            events_routed: self.events_routed.load(Ordering::Relaxed),
            events_unrouted: self.events_unrouted.load(Ordering::Relaxed),
            callbacks_fired: self.callbacks_fired.load(Ordering::Relaxed),
            callback_errors: self.callback_errors.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            full_resyncs: self.full_resyncs.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_stale_hits: self.cache_stale_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_invalidations: self.cache_invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub events_malformed: u64,
    pub events_routed: u64,
    pub events_unrouted: u64,
    pub callbacks_fired: u64,
    pub callback_errors: u64,
    pub reconnect_attempts: u64,
    pub reconnects: u64,
    pub full_resyncs: u64,
    pub cache_hits: u64,
    pub cache_stale_hits: u64,
    pub cache_misses: u64,
    pub cache_invalidations: u64,
}
