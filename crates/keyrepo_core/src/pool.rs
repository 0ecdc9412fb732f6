//! Sharded weak interning pools for keys and key names.
//!
//! A pool maps a freshly built value to the one shared instance equal to it.
//! Members are held weakly: once every holder outside the pool drops its
//! `Arc`, the entry is dead and is swept the next time its shard reaches the
//! sweep threshold. Live entries are never evicted.
//!
//! ```text
//! KeyPool
//! +-- shards: [Mutex<Shard>; 2^n]     selected by hash & mask
//!     +-- buckets: HashMap<hash, Vec<Weak<Key>>>
//! ```

use crate::config::PoolConfig;
use crate::key::{Key, SharedKey, NON_INITIALIZED};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Upper bound on the total initial capacity spread over all shards.
const TOTAL_INITIAL_CAPACITY: usize = 64 * 1024;

/// A value that can live in a [`ShardedPool`].
pub trait PoolMember: Eq {
    /// Hash used for shard and bucket selection. Must agree with `Eq`.
    fn pool_hash(&self) -> u64;
}

impl PoolMember for Key {
    fn pool_hash(&self) -> u64 {
        self.hash_code()
    }
}

impl PoolMember for str {
    fn pool_hash(&self) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for &b in self.as_bytes() {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash ^ (hash >> 32)
    }
}

/// Shard count and per-shard capacity for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizing {
    /// Number of shards, always a power of two.
    pub shards: usize,
    /// Initial bucket capacity of each shard.
    pub shard_capacity: usize,
    /// Inserts into a shard between sweeps of its dead entries.
    pub sweep_threshold: usize,
}

impl PoolSizing {
    /// Sizing for a machine with `cores` hardware threads.
    ///
    /// Low-core machines get fewer, larger shards; high-core machines get
    /// more, smaller ones to spread lock contention.
    pub fn for_cores(cores: usize) -> Self {
        let shards = (cores.max(1) * 4).next_power_of_two().clamp(8, 256);
        let shard_capacity = TOTAL_INITIAL_CAPACITY / shards;
        Self {
            shards,
            shard_capacity,
            sweep_threshold: shard_capacity,
        }
    }

    /// Sizing from configuration, filling gaps from the detected core count.
    pub fn from_config(config: &PoolConfig) -> Self {
        let detected = Self::for_cores(num_cpus::get());
        let shards = config
            .shards
            .map(|n| n.max(1).next_power_of_two())
            .unwrap_or(detected.shards);
        let shard_capacity = config
            .shard_capacity
            .unwrap_or(TOTAL_INITIAL_CAPACITY / shards);
        let sweep_threshold = config.sweep_threshold.unwrap_or(shard_capacity).max(1);
        Self {
            shards,
            shard_capacity,
            sweep_threshold,
        }
    }
}

/// Population of one shard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardStats {
    /// Entries whose value is still referenced outside the pool.
    pub live: usize,
    /// All entries, including dead ones not swept yet.
    pub total: usize,
}

/// Population of a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Per-shard populations, indexed by shard.
    pub shards: Vec<ShardStats>,
}

impl PoolStats {
    /// Live entries over all shards.
    pub fn live(&self) -> usize {
        self.shards.iter().map(|s| s.live).sum()
    }

    /// All entries over all shards.
    pub fn total(&self) -> usize {
        self.shards.iter().map(|s| s.total).sum()
    }
}

struct Shard<T: ?Sized> {
    buckets: HashMap<u64, Vec<Weak<T>>>,
    entries: usize,
    inserts_since_sweep: usize,
}

impl<T: ?Sized + PoolMember> Shard<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buckets: HashMap::with_capacity(capacity),
            entries: 0,
            inserts_since_sweep: 0,
        }
    }

    fn find_live(&self, hash: u64, probe: &T) -> Option<Arc<T>> {
        self.buckets
            .get(&hash)?
            .iter()
            .filter_map(Weak::upgrade)
            .find(|live| **live == *probe)
    }

    fn insert(&mut self, hash: u64, member: &Arc<T>, sweep_threshold: usize) {
        self.buckets
            .entry(hash)
            .or_default()
            .push(Arc::downgrade(member));
        self.entries += 1;
        self.inserts_since_sweep += 1;
        if self.inserts_since_sweep >= sweep_threshold {
            self.sweep();
        }
    }

    fn sweep(&mut self) -> usize {
        let before = self.entries;
        self.buckets.retain(|_, bucket| {
            bucket.retain(|weak| weak.strong_count() > 0);
            !bucket.is_empty()
        });
        self.entries = self.buckets.values().map(Vec::len).sum();
        self.inserts_since_sweep = 0;
        before - self.entries
    }

    fn stats(&self) -> ShardStats {
        let live = self
            .buckets
            .values()
            .flatten()
            .filter(|weak| weak.strong_count() > 0)
            .count();
        ShardStats {
            live,
            total: self.entries,
        }
    }

    fn clear(&mut self) {
        self.buckets.clear();
        self.entries = 0;
        self.inserts_since_sweep = 0;
    }
}

/// Weak-reference interning pool with one lock per shard.
///
/// The shard is a pure function of the member's hash, so equal values always
/// meet under the same lock and at most one canonical instance wins.
pub struct ShardedPool<T: ?Sized> {
    shards: Box<[Mutex<Shard<T>>]>,
    mask: u64,
    sweep_threshold: usize,
}

impl<T: ?Sized + PoolMember> ShardedPool<T> {
    /// Creates a pool with the given sizing.
    pub fn new(sizing: PoolSizing) -> Self {
        let count = sizing.shards.max(1).next_power_of_two();
        let shards = (0..count)
            .map(|_| Mutex::new(Shard::with_capacity(sizing.shard_capacity)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            mask: (count - 1) as u64,
            sweep_threshold: sizing.sweep_threshold.max(1),
        }
    }

    fn shard_of(&self, hash: u64) -> &Mutex<Shard<T>> {
        &self.shards[(hash & self.mask) as usize]
    }

    /// Returns the shared instance equal to `value`, registering `value`
    /// itself if there is none.
    pub fn intern_arc(&self, value: Arc<T>) -> Arc<T> {
        let hash = value.pool_hash();
        let mut shard = self.shard_of(hash).lock();
        if let Some(live) = shard.find_live(hash, &*value) {
            return live;
        }
        shard.insert(hash, &value, self.sweep_threshold);
        value
    }

    /// Like [`ShardedPool::intern_arc`], allocating only on a miss.
    pub fn intern_ref(&self, probe: &T) -> Arc<T>
    where
        for<'a> Arc<T>: From<&'a T>,
    {
        let hash = probe.pool_hash();
        let mut shard = self.shard_of(hash).lock();
        if let Some(live) = shard.find_live(hash, probe) {
            return live;
        }
        let fresh: Arc<T> = Arc::from(probe);
        shard.insert(hash, &fresh, self.sweep_threshold);
        fresh
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Drops dead entries from every shard; returns how many were dropped.
    pub fn sweep(&self) -> usize {
        self.shards.iter().map(|s| s.lock().sweep()).sum()
    }

    /// Current population.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            shards: self.shards.iter().map(|s| s.lock().stats()).collect(),
        }
    }

    /// Forgets every entry. Shared instances stay valid for their holders.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.lock().clear();
        }
    }
}

/// Interning pool for keys.
pub struct KeyPool {
    keys: ShardedPool<Key>,
    trace_distribution: bool,
}

impl KeyPool {
    /// Creates a key pool sized from configuration.
    pub fn new(config: &PoolConfig, trace_distribution: bool) -> Self {
        Self {
            keys: ShardedPool::new(PoolSizing::from_config(config)),
            trace_distribution,
        }
    }

    /// Creates a key pool with explicit sizing.
    pub fn with_sizing(sizing: PoolSizing) -> Self {
        Self {
            keys: ShardedPool::new(sizing),
            trace_distribution: false,
        }
    }

    /// Returns the shared key equal to `key`.
    pub fn intern(&self, key: Key) -> SharedKey {
        self.intern_shared(Arc::new(key))
    }

    /// Returns the shared key equal to `key`.
    ///
    /// When `key` knows its end offset and the shared instance does not yet,
    /// the end offset is cached on the shared instance.
    pub fn intern_shared(&self, key: SharedKey) -> SharedKey {
        let shared = self.keys.intern_arc(key.clone());
        if !Arc::ptr_eq(&shared, &key) && key.is_offset() {
            if let (Some(known), Some(NON_INITIALIZED)) = (key.end_offset(), shared.end_offset()) {
                shared.cache_end_offset(known);
            }
            trace!(key = %shared, "interned existing key");
        }
        shared
    }

    /// Drops dead entries; returns how many were dropped.
    pub fn sweep(&self) -> usize {
        self.keys.sweep()
    }

    /// Current population.
    pub fn stats(&self) -> PoolStats {
        self.keys.stats()
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.keys.shard_count()
    }

    /// Clears every shard, logging the population first when distribution
    /// tracing is on.
    pub fn dispose(&self) {
        if self.trace_distribution {
            let stats = self.keys.stats();
            let populated = stats.shards.iter().filter(|s| s.total > 0).count();
            let max = stats.shards.iter().map(|s| s.total).max().unwrap_or(0);
            debug!(
                shards = stats.shards.len(),
                populated,
                max_per_shard = max,
                live = stats.live(),
                total = stats.total(),
                "key pool distribution at dispose"
            );
            for (idx, shard) in stats.shards.iter().enumerate().filter(|(_, s)| s.total > 0) {
                debug!(shard = idx, live = shard.live, total = shard.total, "key pool shard");
            }
        }
        self.keys.clear();
    }
}

/// Interning pool for key names read from streams.
pub struct NamePool {
    names: ShardedPool<str>,
}

impl NamePool {
    /// Creates a name pool sized from configuration.
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            names: ShardedPool::new(PoolSizing::from_config(config)),
        }
    }

    /// Shared name equal to `name`.
    pub fn intern(&self, name: &str) -> Arc<str> {
        self.names.intern_ref(name)
    }

    /// Drops dead entries; returns how many were dropped.
    pub fn sweep(&self) -> usize {
        self.names.sweep()
    }

    /// Current population.
    pub fn stats(&self) -> PoolStats {
        self.names.stats()
    }

    /// Forgets every entry.
    pub fn dispose(&self) {
        self.names.clear();
    }
}
