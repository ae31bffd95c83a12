//! # Subscription Multiplexer
//!
//! Owns the live channels, deduplicates overlapping transport interest, and
//! routes decoded change events into each matching channel's debounce state.
//!
//! Backend subscriptions are reference-counted per `(table, predicate)`:
//! the first channel interested in a pair opens it, the last one out closes
//! it. Channels keep independent debounce state even when they share a
//! transport subscription.
//!
//! Callbacks run on the dispatch task and are always invoked outside the
//! registry lock; a callback that returns an error or panics is logged and
//! counted without disturbing other channels.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tokio::time::Instant;

use crate::observability::{Logger, MetricsRegistry};

use super::errors::{SyncError, SyncResult};
use super::event::{ChangeEvent, SubscriptionKey, TableId, TableSpec};
use super::scheduler::{DebouncePolicy, DebounceState};
use super::transport::Transport;

/// Outcome of one `on_fire` invocation
pub type FireResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Channel callback: "something relevant changed, refresh now".
///
/// No payload is passed; the callback owns refetching, which keeps it
/// resilient to lost or duplicated events.
pub type FireCallback = Arc<dyn Fn() -> FireResult + Send + Sync>;

/// One live channel
struct Channel {
    specs: Vec<TableSpec>,
    on_fire: FireCallback,
    debounce: DebounceState,
    errors: Arc<AtomicU64>,
    /// Cleared by `unsubscribe`; re-checked at invocation time so a channel
    /// cancelled between deadline collection and invocation never fires
    live: Arc<AtomicBool>,
}

impl Channel {
    fn matches(&self, event: &ChangeEvent) -> bool {
        self.specs.iter().any(|spec| spec.matches(event))
    }
}

#[derive(Default)]
struct MuxInner {
    channels: HashMap<String, Channel>,
    refcounts: HashMap<SubscriptionKey, usize>,
}

/// Routes transport events to channels and manages shared backend
/// subscriptions
pub struct SubscriptionMultiplexer {
    inner: RwLock<MuxInner>,
    transport: Arc<dyn Transport>,
    metrics: Arc<MetricsRegistry>,
}

impl SubscriptionMultiplexer {
    /// Create a multiplexer over the given transport
    pub fn new(transport: Arc<dyn Transport>, metrics: Arc<MetricsRegistry>) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(MuxInner::default()),
            transport,
            metrics,
        })
    }

    /// Register a channel.
    ///
    /// Fails synchronously on a duplicate `channel_id`, empty `specs`, or an
    /// invalid debounce policy; a failed subscribe is never partially
    /// applied (transport subscriptions opened before the failure are
    /// released again).
    pub fn subscribe<F>(
        self: &Arc<Self>,
        channel_id: impl Into<String>,
        specs: Vec<TableSpec>,
        policy: DebouncePolicy,
        on_fire: F,
    ) -> SyncResult<ChannelHandle>
    where
        F: Fn() -> FireResult + Send + Sync + 'static,
    {
        let id = channel_id.into();
        policy.validate()?;
        if specs.is_empty() {
            return Err(SyncError::config("table_specs must be non-empty"));
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|_| SyncError::config("multiplexer lock poisoned"))?;

        if inner.channels.contains_key(&id) {
            return Err(SyncError::DuplicateChannel(id));
        }

        // Acquire one reference per spec, opening the backend subscription
        // on the first reference. Roll back on any failure.
        let mut acquired: Vec<SubscriptionKey> = Vec::with_capacity(specs.len());
        for spec in &specs {
            let key = spec.subscription_key();
            let count = inner.refcounts.get(&key).copied().unwrap_or(0);
            if count == 0 {
                if let Err(err) = self.transport.open(&key) {
                    for key in &acquired {
                        Self::release(&mut inner, self.transport.as_ref(), key);
                    }
                    return Err(err);
                }
            }
            inner.refcounts.insert(key.clone(), count + 1);
            acquired.push(key);
        }

        inner.channels.insert(
            id.clone(),
            Channel {
                specs,
                on_fire: Arc::new(on_fire),
                debounce: DebounceState::new(policy),
                errors: Arc::new(AtomicU64::new(0)),
                live: Arc::new(AtomicBool::new(true)),
            },
        );
        drop(inner);

        Logger::info("CHANNEL_SUBSCRIBED", &[("channel", &id)]);
        Ok(ChannelHandle {
            id,
            mux: Arc::downgrade(self),
        })
    }

    /// Remove a channel. Idempotent: unknown IDs are a no-op.
    ///
    /// Any pending debounce deadline dies with the channel; no callback
    /// fires for it afterwards.
    pub fn unsubscribe(&self, channel_id: &str) -> bool {
        let Ok(mut inner) = self.inner.write() else {
            return false;
        };

        let Some(channel) = inner.channels.remove(channel_id) else {
            return false;
        };
        channel.live.store(false, Ordering::SeqCst);

        for spec in &channel.specs {
            Self::release(&mut inner, self.transport.as_ref(), &spec.subscription_key());
        }
        drop(inner);

        Logger::info("CHANNEL_UNSUBSCRIBED", &[("channel", channel_id)]);
        true
    }

    fn release(inner: &mut MuxInner, transport: &dyn Transport, key: &SubscriptionKey) {
        let Some(count) = inner.refcounts.get_mut(key) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            inner.refcounts.remove(key);
            transport.close(key);
        }
    }

    /// Feed one decoded event into every matching channel's debounce state.
    /// Returns how many channels matched.
    pub fn route(&self, event: &ChangeEvent, now: Instant) -> usize {
        let Ok(mut inner) = self.inner.write() else {
            return 0;
        };

        let mut matched = 0;
        for channel in inner.channels.values_mut() {
            if channel.matches(event) {
                channel.debounce.observe(now);
                matched += 1;
            }
        }
        matched
    }

    /// Earliest pending debounce deadline across all channels
    pub fn next_deadline(&self) -> Option<Instant> {
        let Ok(inner) = self.inner.read() else {
            return None;
        };
        inner
            .channels
            .values()
            .filter_map(|c| c.debounce.deadline())
            .min()
    }

    /// Fire every channel whose deadline has elapsed. Returns the fire count.
    pub fn fire_due(&self, now: Instant) -> usize {
        let due = {
            let Ok(mut inner) = self.inner.write() else {
                return 0;
            };
            inner
                .channels
                .iter_mut()
                .filter(|(_, c)| c.debounce.due(now))
                .map(|(id, c)| {
                    let coalesced = c.debounce.reset();
                    (id.clone(), c.on_fire.clone(), c.errors.clone(), c.live.clone(), coalesced)
                })
                .collect::<Vec<_>>()
        };

        let mut fired = 0;
        for (id, on_fire, errors, live, coalesced) in &due {
            if self.invoke(id, on_fire, errors, live) {
                Logger::trace(
                    "CHANNEL_FIRED",
                    &[("channel", id), ("coalesced", &coalesced.to_string())],
                );
                fired += 1;
            }
        }
        fired
    }

    /// Fire every live channel once, unconditionally, resetting any buffered
    /// state. Used by the resync path after a reconnect.
    pub fn fire_all(&self) -> usize {
        let all = {
            let Ok(mut inner) = self.inner.write() else {
                return 0;
            };
            inner
                .channels
                .iter_mut()
                .map(|(id, c)| {
                    c.debounce.reset();
                    (id.clone(), c.on_fire.clone(), c.errors.clone(), c.live.clone())
                })
                .collect::<Vec<_>>()
        };

        let mut fired = 0;
        for (id, on_fire, errors, live) in &all {
            if self.invoke(id, on_fire, errors, live) {
                fired += 1;
            }
        }
        fired
    }

    /// Invoke one callback, isolating failures to its channel.
    ///
    /// Returns false for channels cancelled after they were collected for
    /// firing: a concurrent `unsubscribe` (including one from another
    /// channel's callback) wins over a pending invocation.
    fn invoke(
        &self,
        channel_id: &str,
        on_fire: &FireCallback,
        errors: &AtomicU64,
        live: &AtomicBool,
    ) -> bool {
        if !live.load(Ordering::SeqCst) {
            return false;
        }
        self.metrics.incr_callbacks_fired();
        match catch_unwind(AssertUnwindSafe(|| on_fire())) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                errors.fetch_add(1, Ordering::Relaxed);
                self.metrics.incr_callback_errors();
                Logger::warn(
                    "CALLBACK_FAILED",
                    &[("channel", channel_id), ("error", &err.to_string())],
                );
            }
            Err(_) => {
                errors.fetch_add(1, Ordering::Relaxed);
                self.metrics.incr_callback_errors();
                Logger::warn("CALLBACK_PANICKED", &[("channel", channel_id)]);
            }
        }
        true
    }

    /// Every table observed by any live channel
    pub fn observed_tables(&self) -> HashSet<TableId> {
        let Ok(inner) = self.inner.read() else {
            return HashSet::new();
        };
        inner
            .channels
            .values()
            .flat_map(|c| c.specs.iter().map(|s| s.table.clone()))
            .collect()
    }

    /// True when a channel with this ID is live
    pub fn has_channel(&self, channel_id: &str) -> bool {
        self.inner
            .read()
            .map(|i| i.channels.contains_key(channel_id))
            .unwrap_or(false)
    }

    /// Failed-callback count for one channel
    pub fn channel_error_count(&self, channel_id: &str) -> Option<u64> {
        let inner = self.inner.read().ok()?;
        inner
            .channels
            .get(channel_id)
            .map(|c| c.errors.load(Ordering::Relaxed))
    }

    /// Number of live channels
    pub fn channel_count(&self) -> usize {
        self.inner.read().map(|i| i.channels.len()).unwrap_or(0)
    }
}

/// Handle to one live channel; disposal is manual and idempotent
pub struct ChannelHandle {
    id: String,
    mux: Weak<SubscriptionMultiplexer>,
}

impl ChannelHandle {
    /// Channel ID this handle controls
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Remove the channel. Calling this twice, or after the multiplexer
    /// itself is gone, is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(mux) = self.mux.upgrade() {
            mux.unsubscribe(&self.id);
        }
    }
}
