//! # Realtime Synchronization Core
//!
//! Subscription multiplexing, burst coalescing, and reconnection for
//! workspace-scoped change notifications.
//!
//! ## Architecture
//!
//! - **Event model**: typed change events, table/predicate specs
//! - **Scheduler**: per-channel sliding debounce with a hard latency cap
//! - **Multiplexer**: channel registry, shared backend subscriptions, routing
//! - **Transport**: injected backend seam, fake included for tests
//! - **Reconnect**: backoff state machine, full resync on recovery
//! - **Dispatcher**: the single event loop tying the pieces together

pub mod dispatcher;
pub mod errors;
pub mod event;
pub mod multiplexer;
pub mod reconnect;
pub mod scheduler;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use errors::{SyncError, SyncResult};
pub use event::{ChangeEvent, Operation, Predicate, SubscriptionKey, TableId, TableSpec, WorkspaceId};
pub use multiplexer::{ChannelHandle, FireCallback, FireResult, SubscriptionMultiplexer};
pub use reconnect::{ReconnectPolicy, ReconnectionManager};
pub use scheduler::{DebouncePolicy, DebounceState, DEFAULT_DEBOUNCE, DEFAULT_MAX_WAIT};
pub use transport::{
    ConnectionState, FakeTransport, FrameReceiver, FrameSender, Transport, TransportFrame,
};
