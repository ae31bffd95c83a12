//! livesync - realtime change coalescing and query-cache invalidation
//!
//! The coordination core a client keeps in memory for the lifetime of a
//! workspace session: it multiplexes row-level change notifications across
//! channels, coalesces bursts into bounded-latency refresh signals, keeps a
//! fingerprinted query cache precisely invalidated, and converges after
//! transport drops with a full resync.

pub mod cache;
pub mod config;
pub mod observability;
pub mod sync;
