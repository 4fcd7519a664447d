use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{AnalysisResult, ExerciseKind};

/// Identity of a cached analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub frame_identity: String,
    pub exercise_type: ExerciseKind,
}

impl CacheKey {
    pub fn new(frame_identity: impl Into<String>, exercise_type: ExerciseKind) -> Self {
        Self {
            frame_identity: frame_identity.into(),
            exercise_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: AnalysisResult,
    /// Monotonic access tick; larger is more recent.
    pub last_access: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded least-recently-used cache of analysis results.
///
/// Entries live in a hash map; a second ordered map from access tick to key
/// keeps the eviction candidate at its front.
#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    entries: HashMap<CacheKey, CacheEntry>,
    recency: BTreeMap<u64, CacheKey>,
    tick: u64,
    stats: CacheStats,
}

impl ResultCache {
    /// Creates a cache holding at most `capacity` results (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            recency: BTreeMap::new(),
            tick: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Returns the cached result and marks it most recently used.
    pub fn get(&mut self, key: &CacheKey) -> Option<AnalysisResult> {
        let tick = self.next_tick();
        let Some(entry) = self.entries.get_mut(key) else {
            self.stats.misses += 1;
            return None;
        };

        self.recency.remove(&entry.last_access);
        entry.last_access = tick;
        self.recency.insert(tick, key.clone());
        self.stats.hits += 1;
        Some(entry.value.clone())
    }

    /// Looks at an entry without touching its recency.
    pub fn peek(&self, key: &CacheKey) -> Option<&AnalysisResult> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts or replaces a result. At capacity the least recently used entry
    /// is evicted first.
    pub fn put(&mut self, key: CacheKey, value: AnalysisResult) {
        let tick = self.next_tick();

        if let Some(entry) = self.entries.get_mut(&key) {
            self.recency.remove(&entry.last_access);
            entry.last_access = tick;
            entry.value = value;
            self.recency.insert(tick, key);
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        self.recency.insert(tick, key.clone());
        self.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                last_access: tick,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    fn evict_oldest(&mut self) {
        if let Some((_, key)) = self.recency.pop_first() {
            tracing::debug!(frame = %key.frame_identity, "evicting cached analysis");
            self.entries.remove(&key);
            self.stats.evictions += 1;
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}
