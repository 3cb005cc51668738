//! TTL table shared by both cache tiers.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{RwLock, RwLockWriteGuard};
use tokio::time::Instant;

/// A resolved value with the moment it was resolved.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    /// Monotonic resolution time, used for freshness.
    pub resolved_at: Instant,
    /// Wall-clock resolution time (unix seconds), for reporting.
    pub resolved_at_unix: i64,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            resolved_at: Instant::now(),
            resolved_at_unix: chrono::Utc::now().timestamp(),
        }
    }

    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.resolved_at)
    }

    /// Fresh iff the entry will still be younger than `ttl` after `horizon`.
    pub fn is_fresh(&self, ttl: Duration, horizon: Duration) -> bool {
        self.age().saturating_add(horizon) < ttl
    }
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    /// A fresh entry.
    Hit { value: V, age: Duration },
    /// No usable entry. `generation` must be handed back to [`TtlStore::store`].
    Miss { generation: u64, stale: bool },
}

/// The locked contents of a [`TtlStore`].
#[derive(Debug)]
pub struct Table<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Bumped on every clear; writes carrying an older generation are dropped.
    generation: u64,
}

impl<V> Table<V> {
    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// `RwLock<HashMap>` keyed by string with a fixed TTL.
///
/// The lock is only ever held for a map operation, never across a resolver
/// call.
#[derive(Debug)]
pub struct TtlStore<V> {
    table: RwLock<Table<V>>,
    ttl: Duration,
}

impl<V: Clone> TtlStore<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            table: RwLock::new(Table {
                entries: HashMap::new(),
                generation: 0,
            }),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read `key`, treating entries that expire within `horizon` as misses.
    pub async fn lookup(&self, key: &str, horizon: Duration) -> Lookup<V> {
        let table = self.table.read().await;
        match table.entries.get(key) {
            Some(entry) if entry.is_fresh(self.ttl, horizon) => Lookup::Hit {
                value: entry.value.clone(),
                age: entry.age(),
            },
            Some(_) => Lookup::Miss {
                generation: table.generation,
                stale: true,
            },
            None => Lookup::Miss {
                generation: table.generation,
                stale: false,
            },
        }
    }

    /// Store a freshly resolved value, overwriting any previous entry.
    ///
    /// Returns `false` (and stores nothing) if the table was cleared after
    /// `generation` was read.
    pub async fn store(&self, key: String, value: V, generation: u64) -> bool {
        let mut table = self.table.write().await;
        if table.generation != generation {
            return false;
        }
        table.entries.insert(key, CacheEntry::new(value));
        true
    }

    /// Modify an existing entry in place without touching its timestamp.
    pub async fn update<F>(&self, key: &str, f: F) -> bool
    where
        F: FnOnce(&mut V),
    {
        let mut table = self.table.write().await;
        match table.entries.get_mut(key) {
            Some(entry) => {
                f(&mut entry.value);
                true
            }
            None => false,
        }
    }

    /// Exclusive access to the whole table, for multi-table operations.
    pub async fn lock(&self) -> RwLockWriteGuard<'_, Table<V>> {
        self.table.write().await
    }

    /// Copy of every entry, fresh or stale, sorted by key.
    pub async fn entries(&self) -> Vec<(String, CacheEntry<V>)> {
        let table = self.table.read().await;
        let mut entries: Vec<_> = table
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }
}
