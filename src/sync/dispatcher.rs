//! # Dispatch Loop
//!
//! The single cooperative event loop composing transport, multiplexer,
//! scheduler deadlines, cache invalidation, and reconnection. All routing,
//! timer firing, and resync happen as discrete turns of this one task;
//! `subscribe`, `unsubscribe`, and cache calls stay synchronous and
//! non-blocking from any thread.
//!
//! While a reconnect is in progress the loop processes no frames (the
//! transport delivers none anyway); any burst buffered at disconnect time
//! is superseded by the unconditional resync fire.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::QueryCache;
use crate::config::SyncConfig;
use crate::observability::{Logger, MetricsRegistry, MetricsSnapshot};

use super::errors::SyncResult;
use super::event::{ChangeEvent, TableSpec};
use super::multiplexer::{ChannelHandle, FireResult, SubscriptionMultiplexer};
use super::reconnect::ReconnectionManager;
use super::scheduler::DebouncePolicy;
use super::transport::{ConnectionState, FrameReceiver, Transport, TransportFrame};

/// One workspace session's realtime-to-cache synchronization core
pub struct Dispatcher {
    config: SyncConfig,
    multiplexer: Arc<SubscriptionMultiplexer>,
    cache: Arc<QueryCache>,
    reconnect: ReconnectionManager,
    transport: Arc<dyn Transport>,
    metrics: Arc<MetricsRegistry>,
}

impl Dispatcher {
    /// Wire up a session over the given transport
    pub fn new(transport: Arc<dyn Transport>, config: SyncConfig) -> SyncResult<Arc<Self>> {
        config.validate()?;

        let metrics = Arc::new(MetricsRegistry::new());
        let multiplexer = SubscriptionMultiplexer::new(Arc::clone(&transport), Arc::clone(&metrics));
        let cache = Arc::new(QueryCache::with_metrics(config.cache_mode, Arc::clone(&metrics)));
        let reconnect = ReconnectionManager::new(config.reconnect.clone(), Arc::clone(&metrics));

        Ok(Arc::new(Self {
            config,
            multiplexer,
            cache,
            reconnect,
            transport,
            metrics,
        }))
    }

    /// Register a channel under the session's default debounce policy
    pub fn subscribe<F>(
        &self,
        channel_id: impl Into<String>,
        specs: Vec<TableSpec>,
        on_fire: F,
    ) -> SyncResult<ChannelHandle>
    where
        F: Fn() -> FireResult + Send + Sync + 'static,
    {
        self.multiplexer
            .subscribe(channel_id, specs, self.config.debounce, on_fire)
    }

    /// Register a channel with its own debounce policy
    pub fn subscribe_with_policy<F>(
        &self,
        channel_id: impl Into<String>,
        specs: Vec<TableSpec>,
        policy: DebouncePolicy,
        on_fire: F,
    ) -> SyncResult<ChannelHandle>
    where
        F: Fn() -> FireResult + Send + Sync + 'static,
    {
        self.multiplexer.subscribe(channel_id, specs, policy, on_fire)
    }

    /// Remove a channel by ID; idempotent
    pub fn unsubscribe(&self, channel_id: &str) -> bool {
        self.multiplexer.unsubscribe(channel_id)
    }

    /// The session's shared query cache
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// The session's multiplexer (channel introspection)
    pub fn multiplexer(&self) -> &Arc<SubscriptionMultiplexer> {
        &self.multiplexer
    }

    /// Current transport connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.reconnect.state()
    }

    /// Observe connection state transitions
    pub fn watch_connection(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.reconnect.watch()
    }

    /// Request an immediate reconnect attempt (from `Degraded`)
    pub fn retry_now(&self) {
        self.reconnect.retry_now();
    }

    /// Snapshot of the session's counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Spawn the dispatch loop onto the runtime
    pub fn spawn(self: &Arc<Self>, frames: FrameReceiver) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(dispatcher.run(frames))
    }

    /// Drive the dispatch loop until the frame stream closes
    pub async fn run(self: Arc<Self>, mut frames: FrameReceiver) {
        loop {
            let deadline = self.multiplexer.next_deadline();
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(TransportFrame::Event(raw)) => self.on_frame(raw),
                    Some(TransportFrame::Disconnected) => self.on_disconnect().await,
                    None => break,
                },
                _ = Self::sleep_until(deadline) => {
                    self.multiplexer.fire_due(Instant::now());
                }
            }
        }
        Logger::info("DISPATCH_STOPPED", &[]);
    }

    async fn sleep_until(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    fn on_frame(&self, raw: Value) {
        self.metrics.incr_events_received();

        let event: ChangeEvent = match serde_json::from_value(raw) {
            Ok(event) => event,
            Err(err) => {
                // Fail-soft: a bad frame never takes the loop down
                self.metrics.incr_events_malformed();
                Logger::warn("EVENT_MALFORMED", &[("reason", &err.to_string())]);
                return;
            }
        };

        // Staleness is marked per event; the debounced callback only
        // batches the refetches that follow.
        self.cache.invalidate(&event.table, &event.workspace_id);

        let matched = self.multiplexer.route(&event, Instant::now());
        if matched == 0 {
            self.metrics.incr_events_unrouted();
            Logger::trace("EVENT_UNROUTED", &[("table", event.table.as_str())]);
        } else {
            self.metrics.add_events_routed(matched as u64);
        }
    }

    async fn on_disconnect(&self) {
        Logger::warn("TRANSPORT_DISCONNECTED", &[]);
        self.reconnect.reestablish(self.transport.as_ref()).await;

        // Events delivered while disconnected are unrecoverable: invalidate
        // everything the live channels observe and fire each of them once.
        let tables = self.multiplexer.observed_tables();
        let invalidated = self.cache.invalidate_tables(tables.iter());
        let fired = self.multiplexer.fire_all();
        self.metrics.incr_full_resyncs();

        Logger::info(
            "RESYNC_COMPLETE",
            &[
                ("channels_fired", &fired.to_string()),
                ("entries_invalidated", &invalidated.to_string()),
            ],
        );
    }
}
