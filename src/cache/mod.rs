//! # Query Cache
//!
//! Client-side query-result cache with fingerprinted keys and precise,
//! table-scoped invalidation.
//!
//! - **Fingerprint**: deterministic key over `(resource kind, params, workspace)`
//! - **Store**: stale-while-revalidate reads, TTL expiry, eviction mode
//! - **Invalidation**: table-indexed, workspace-scoped staleness marking

mod fingerprint;
mod store;

pub use fingerprint::Fingerprint;
pub use store::{CacheRead, InvalidationMode, QueryCache};
