//! # Query Cache & Invalidation Engine
//!
//! In-memory store of query results keyed by [`Fingerprint`], with
//! mutation-driven invalidation scoped by table and workspace.
//!
//! Reads are stale-while-revalidate by default: `get` returns the cached
//! value even when it has been invalidated or its TTL elapsed, flagging it
//! stale so the caller can refetch in the background without UI flicker.
//! [`InvalidationMode::Evict`] hard-deletes instead, for callers that need
//! strict consistency.
//!
//! The cache is the sole writer of staleness: callers write values through
//! `set` but can never mark an entry stale directly.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::observability::MetricsRegistry;
use crate::sync::{TableId, WorkspaceId};

use super::fingerprint::Fingerprint;

/// What invalidation does to an affected entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidationMode {
    /// Mark stale; `get` keeps serving the old value with a stale flag
    #[default]
    StaleWhileRevalidate,
    /// Delete immediately; subsequent `get` misses
    Evict,
}

/// One cached query result
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    workspace: WorkspaceId,
    inserted_at: Instant,
    stale_after: Duration,
    affected_tables: HashSet<TableId>,
    stale: bool,
}

impl CacheEntry {
    fn is_stale(&self, now: Instant) -> bool {
        self.stale || now.duration_since(self.inserted_at) >= self.stale_after
    }
}

/// Result of a cache read
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead {
    /// Cached value (possibly stale)
    pub value: Value,
    /// True when the caller should refetch in the background
    pub stale: bool,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<Fingerprint, CacheEntry>,
    /// table -> keys whose affected_tables include it, so invalidation
    /// avoids scanning every entry
    by_table: HashMap<TableId, HashSet<Fingerprint>>,
}

impl CacheInner {
    fn deindex(&mut self, key: &Fingerprint, tables: &HashSet<TableId>) {
        for table in tables {
            if let Some(keys) = self.by_table.get_mut(table) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_table.remove(table);
                }
            }
        }
    }
}

/// Shared query-result cache for one workspace session
#[derive(Debug)]
pub struct QueryCache {
    inner: RwLock<CacheInner>,
    mode: InvalidationMode,
    metrics: Arc<MetricsRegistry>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(InvalidationMode::default())
    }
}

impl QueryCache {
    /// Create a cache with its own metrics registry
    pub fn new(mode: InvalidationMode) -> Self {
        Self::with_metrics(mode, Arc::new(MetricsRegistry::new()))
    }

    /// Create a cache sharing a session-wide metrics registry
    pub fn with_metrics(mode: InvalidationMode, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            mode,
            metrics,
        }
    }

    /// Invalidation mode of this cache
    pub fn mode(&self) -> InvalidationMode {
        self.mode
    }

    /// Read an entry.
    ///
    /// Returns the value even when stale; the `stale` flag tells the caller
    /// to refetch. Misses only when the key was never set or was evicted.
    pub fn get(&self, key: &Fingerprint) -> Option<CacheRead> {
        let now = Instant::now();

        let Ok(inner) = self.inner.read() else {
            return None;
        };

        match inner.entries.get(key) {
            Some(entry) => {
                let stale = entry.is_stale(now);
                if stale {
                    self.metrics.incr_cache_stale_hits();
                } else {
                    self.metrics.incr_cache_hits();
                }
                Some(CacheRead {
                    value: entry.value.clone(),
                    stale,
                })
            }
            None => {
                self.metrics.incr_cache_misses();
                None
            }
        }
    }

    /// Insert or replace an entry after a successful fetch.
    ///
    /// `affected_tables` must cover every table whose mutation can change
    /// this value; an omitted table silently exempts the entry from
    /// invalidation on that table's events.
    pub fn set(
        &self,
        key: Fingerprint,
        value: Value,
        ttl: Duration,
        affected_tables: impl IntoIterator<Item = TableId>,
        workspace: WorkspaceId,
    ) {
        let tables: HashSet<TableId> = affected_tables.into_iter().collect();

        let Ok(mut inner) = self.inner.write() else {
            return;
        };

        if let Some(old) = inner.entries.remove(&key) {
            let old_tables = old.affected_tables;
            inner.deindex(&key, &old_tables);
        }

        for table in &tables {
            inner.by_table.entry(table.clone()).or_default().insert(key);
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                workspace,
                inserted_at: Instant::now(),
                stale_after: ttl,
                affected_tables: tables,
                stale: false,
            },
        );
    }

    /// Invalidate every entry whose `affected_tables` include `table` and
    /// whose workspace matches. Returns how many entries were affected.
    pub fn invalidate(&self, table: &TableId, workspace: &WorkspaceId) -> usize {
        let Ok(mut inner) = self.inner.write() else {
            return 0;
        };

        let keys: Vec<Fingerprint> = inner
            .by_table
            .get(table)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        let mut affected = 0;
        for key in keys {
            let matches = inner
                .entries
                .get(&key)
                .map_or(false, |e| &e.workspace == workspace);
            if matches {
                self.apply_invalidation(&mut inner, &key);
                affected += 1;
            }
        }

        self.metrics.add_cache_invalidations(affected as u64);
        affected
    }

    /// Invalidate every entry touching any of `tables`, across workspaces.
    ///
    /// Used by the resync path after a reconnect, where missed events make
    /// every observed table suspect. Each entry is affected at most once
    /// even when several of its tables are listed.
    pub fn invalidate_tables<'a>(&self, tables: impl IntoIterator<Item = &'a TableId>) -> usize {
        let Ok(mut inner) = self.inner.write() else {
            return 0;
        };

        let mut keys: HashSet<Fingerprint> = HashSet::new();
        for table in tables {
            if let Some(set) = inner.by_table.get(table) {
                keys.extend(set.iter().copied());
            }
        }

        let affected = keys.len();
        for key in keys {
            self.apply_invalidation(&mut inner, &key);
        }

        self.metrics.add_cache_invalidations(affected as u64);
        affected
    }

    fn apply_invalidation(&self, inner: &mut CacheInner, key: &Fingerprint) {
        match self.mode {
            InvalidationMode::StaleWhileRevalidate => {
                if let Some(entry) = inner.entries.get_mut(key) {
                    entry.stale = true;
                }
            }
            InvalidationMode::Evict => {
                if let Some(entry) = inner.entries.remove(key) {
                    inner.deindex(key, &entry.affected_tables);
                }
            }
        }
    }

    /// Remove one entry
    pub fn remove(&self, key: &Fingerprint) {
        let Ok(mut inner) = self.inner.write() else {
            return;
        };
        if let Some(entry) = inner.entries.remove(key) {
            let tables = entry.affected_tables;
            inner.deindex(key, &tables);
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.entries.clear();
            inner.by_table.clear();
        }
    }

    /// Number of live entries (stale entries included)
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.entries.len()).unwrap_or(0)
    }

    /// True when the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(kind: &str, ws: &str) -> Fingerprint {
        Fingerprint::compute(kind, &json!({}), &WorkspaceId::new(ws))
    }

    fn tables(names: &[&str]) -> Vec<TableId> {
        names.iter().map(|n| TableId::new(*n)).collect()
    }

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_get_miss() {
        let cache = QueryCache::default();
        assert!(cache.get(&key("projects", "ws-1")).is_none());
    }

    #[test]
    fn test_set_then_get_fresh() {
        let cache = QueryCache::default();
        let k = key("projects", "ws-1");
        cache.set(k, json!([1, 2, 3]), TTL, tables(&["projects"]), WorkspaceId::new("ws-1"));

        let read = cache.get(&k).unwrap();
        assert_eq!(read.value, json!([1, 2, 3]));
        assert!(!read.stale);
    }

    #[test]
    fn test_invalidate_scoped_by_table_and_workspace() {
        let cache = QueryCache::default();
        let k1 = key("projects", "ws-1");
        let k2 = key("projects", "ws-2");
        let k3 = key("assets", "ws-1");

        cache.set(k1, json!(1), TTL, tables(&["projects"]), WorkspaceId::new("ws-1"));
        cache.set(k2, json!(2), TTL, tables(&["projects"]), WorkspaceId::new("ws-2"));
        cache.set(k3, json!(3), TTL, tables(&["assets"]), WorkspaceId::new("ws-1"));

        let affected = cache.invalidate(&TableId::new("projects"), &WorkspaceId::new("ws-1"));
        assert_eq!(affected, 1);

        assert!(cache.get(&k1).unwrap().stale);
        assert!(!cache.get(&k2).unwrap().stale);
        assert!(!cache.get(&k3).unwrap().stale);
    }

    #[test]
    fn test_stale_while_revalidate_keeps_value() {
        let cache = QueryCache::new(InvalidationMode::StaleWhileRevalidate);
        let k = key("projects", "ws-1");
        cache.set(k, json!({"rows": 9}), TTL, tables(&["projects"]), WorkspaceId::new("ws-1"));

        cache.invalidate(&TableId::new("projects"), &WorkspaceId::new("ws-1"));

        let read = cache.get(&k).unwrap();
        assert!(read.stale);
        assert_eq!(read.value, json!({"rows": 9}));
    }

    #[test]
    fn test_evict_mode_deletes() {
        let cache = QueryCache::new(InvalidationMode::Evict);
        let k = key("projects", "ws-1");
        cache.set(k, json!(1), TTL, tables(&["projects"]), WorkspaceId::new("ws-1"));

        cache.invalidate(&TableId::new("projects"), &WorkspaceId::new("ws-1"));

        assert!(cache.get(&k).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_multi_table_entry_invalidated_by_any() {
        let cache = QueryCache::default();
        let k = key("project-summary", "ws-1");
        cache.set(
            k,
            json!({}),
            TTL,
            tables(&["projects", "people"]),
            WorkspaceId::new("ws-1"),
        );

        cache.invalidate(&TableId::new("people"), &WorkspaceId::new("ws-1"));
        assert!(cache.get(&k).unwrap().stale);
    }

    #[test]
    fn test_set_refreshes_staleness() {
        let cache = QueryCache::default();
        let k = key("projects", "ws-1");
        cache.set(k, json!(1), TTL, tables(&["projects"]), WorkspaceId::new("ws-1"));
        cache.invalidate(&TableId::new("projects"), &WorkspaceId::new("ws-1"));
        assert!(cache.get(&k).unwrap().stale);

        // The caller refetched and rewrote the entry.
        cache.set(k, json!(2), TTL, tables(&["projects"]), WorkspaceId::new("ws-1"));
        let read = cache.get(&k).unwrap();
        assert!(!read.stale);
        assert_eq!(read.value, json!(2));
    }

    #[test]
    fn test_invalidate_tables_counts_entries_once() {
        let cache = QueryCache::default();
        let k = key("project-summary", "ws-1");
        cache.set(
            k,
            json!({}),
            TTL,
            tables(&["projects", "people"]),
            WorkspaceId::new("ws-1"),
        );

        let t = tables(&["projects", "people"]);
        let affected = cache.invalidate_tables(t.iter());
        assert_eq!(affected, 1);
    }

    #[test]
    fn test_invalidate_tables_crosses_workspaces() {
        let cache = QueryCache::default();
        let k1 = key("projects", "ws-1");
        let k2 = key("projects", "ws-2");
        cache.set(k1, json!(1), TTL, tables(&["projects"]), WorkspaceId::new("ws-1"));
        cache.set(k2, json!(2), TTL, tables(&["projects"]), WorkspaceId::new("ws-2"));

        let t = tables(&["projects"]);
        assert_eq!(cache.invalidate_tables(t.iter()), 2);
        assert!(cache.get(&k1).unwrap().stale);
        assert!(cache.get(&k2).unwrap().stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_flags_stale() {
        let cache = QueryCache::default();
        let k = key("projects", "ws-1");
        cache.set(
            k,
            json!(1),
            Duration::from_secs(30),
            tables(&["projects"]),
            WorkspaceId::new("ws-1"),
        );

        assert!(!cache.get(&k).unwrap().stale);

        tokio::time::advance(Duration::from_secs(31)).await;

        // TTL staleness is independent of mutation-driven invalidation.
        let read = cache.get(&k).unwrap();
        assert!(read.stale);
        assert_eq!(read.value, json!(1));
    }

    #[test]
    fn test_remove_deindexes() {
        let cache = QueryCache::default();
        let k = key("projects", "ws-1");
        cache.set(k, json!(1), TTL, tables(&["projects"]), WorkspaceId::new("ws-1"));
        cache.remove(&k);

        assert!(cache.get(&k).is_none());
        assert_eq!(cache.invalidate(&TableId::new("projects"), &WorkspaceId::new("ws-1")), 0);
    }
}
