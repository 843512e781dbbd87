//! Content-addressed caches shared across runs
//!
//! [`FingerprintCache`] is a bounded LRU map from fingerprint to shared
//! value. The lock is held only for the lookup or insert itself; values are
//! handed out as `Arc`s so callers never hold the lock while working.

use crate::config::CacheConfig;
use eeg_core::{EegResult, Fingerprint, Recording};
use eeg_processing::FeatureBundle;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Hit and miss counters of one cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct LruState<V> {
    /// Value and the tick of its last use
    map: HashMap<Fingerprint, (Arc<V>, u64)>,
    /// Use tick to key, least recently used first
    order: BTreeMap<u64, Fingerprint>,
    tick: u64,
}

impl<V> LruState<V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: &Fingerprint) {
        let tick = self.next_tick();
        if let Some((_, used)) = self.map.get_mut(key) {
            self.order.remove(&*used);
            *used = tick;
            self.order.insert(tick, *key);
        }
    }

    fn put(&mut self, key: Fingerprint, value: Arc<V>) {
        let tick = self.next_tick();
        if let Some((_, used)) = self.map.insert(key, (value, tick)) {
            self.order.remove(&used);
        }
        self.order.insert(tick, key);
    }

    fn evict_oldest(&mut self) -> Option<Fingerprint> {
        let (_, oldest) = self.order.pop_first()?;
        self.map.remove(&oldest);
        Some(oldest)
    }
}

/// Bounded LRU cache keyed by content fingerprint
pub struct FingerprintCache<V> {
    state: Mutex<LruState<V>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> FingerprintCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState {
                map: HashMap::new(),
                order: BTreeMap::new(),
                tick: 0,
            }),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up `key`, marking it most recently used
    pub fn get(&self, key: &Fingerprint) -> Option<Arc<V>> {
        let mut state = self.state.lock();
        let found = state.map.get(key).map(|(value, _)| Arc::clone(value));
        match found {
            Some(value) => {
                state.touch(key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a value, replacing any previous entry under the same key
    pub fn insert(&self, key: Fingerprint, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.insert_arc(key, Arc::clone(&value));
        value
    }

    /// Insert an already shared value, evicting the least recently used entries
    pub fn insert_arc(&self, key: Fingerprint, value: Arc<V>) {
        let mut state = self.state.lock();
        if !state.map.contains_key(&key) {
            while state.map.len() >= self.capacity {
                let Some(oldest) = state.evict_oldest() else {
                    break;
                };
                debug!(key = %oldest.short(), "cache evicted");
            }
        }
        state.put(key, value);
    }

    /// Most recently used entry
    pub fn most_recent(&self) -> Option<(Fingerprint, Arc<V>)> {
        let state = self.state.lock();
        let (_, key) = state.order.last_key_value()?;
        state.map.get(key).map(|(value, _)| (*key, Arc::clone(value)))
    }

    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.state.lock().map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

/// All caches the pipeline shares between runs
pub struct PipelineCaches {
    recordings: FingerprintCache<Recording>,
    bundles: FingerprintCache<FeatureBundle>,
    /// Source fingerprint to the fingerprint of its latest bundle
    source_index: FingerprintCache<Fingerprint>,
}

impl Default for PipelineCaches {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl PipelineCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            recordings: FingerprintCache::new(config.recording_capacity),
            bundles: FingerprintCache::new(config.bundle_capacity),
            source_index: FingerprintCache::new(config.bundle_capacity),
        }
    }

    /// Recordings keyed by their source bytes and parse settings
    pub fn recordings(&self) -> &FingerprintCache<Recording> {
        &self.recordings
    }

    /// Bundles keyed by the fingerprint of their canonical JSON
    pub fn bundles(&self) -> &FingerprintCache<FeatureBundle> {
        &self.bundles
    }

    /// Cache a validated bundle and index it under its source
    pub fn store_bundle(
        &self,
        source: Option<Fingerprint>,
        bundle: FeatureBundle,
    ) -> EegResult<(Fingerprint, Arc<FeatureBundle>)> {
        let key = bundle.fingerprint()?;
        let bundle = self.bundles.insert(key, bundle);
        if let Some(source) = source {
            self.source_index.insert(source, key);
        }
        Ok((key, bundle))
    }

    /// Latest cached bundle extracted from `source`
    pub fn bundle_for_source(&self, source: &Fingerprint) -> Option<(Fingerprint, Arc<FeatureBundle>)> {
        let key = *self.source_index.get(source)?;
        self.bundles.get(&key).map(|bundle| (key, bundle))
    }

    /// Most recently used bundle of any source
    pub fn latest_bundle(&self) -> Option<(Fingerprint, Arc<FeatureBundle>)> {
        self.bundles.most_recent()
    }
}
