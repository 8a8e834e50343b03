/*!
 * Snapshot Cache
 * TTL cache of process snapshots with expiration-ordered eviction
 *
 * When full, the entry with the nearest expiration is evicted. This is not
 * LRU: with a uniform TTL it evicts the oldest write, but a freshly written
 * entry is never preferred over an older one.
 */

use super::types::{CacheStats, ProcessSnapshot};
use crate::core::types::Pid;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: ProcessSnapshot,
    inserted_at: Instant,
    expires_at: Instant,
}

/// Bounded TTL cache keyed by PID. Lookups take `&self` so readers can
/// share a read lock; writes need exclusive access.
#[derive(Debug)]
pub struct SnapshotCache {
    entries: HashMap<Pid, CacheEntry>,
    ttl: Duration,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: u64,
}

impl SnapshotCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(max_size.min(1024)),
            ttl,
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: 0,
        }
    }

    /// Look up a live entry at `now`, counting the hit or miss
    pub fn get(&self, pid: Pid, now: Instant) -> Option<ProcessSnapshot> {
        match self.entries.get(&pid) {
            Some(entry) if now < entry.expires_at => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.snapshot.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a snapshot expiring at `now + ttl`.
    /// Returns the PID evicted to make room, if any.
    pub fn insert(&mut self, pid: Pid, snapshot: ProcessSnapshot, now: Instant) -> Option<Pid> {
        if self.max_size == 0 {
            return None;
        }

        let mut evicted = None;
        if !self.entries.contains_key(&pid) && self.entries.len() >= self.max_size {
            evicted = self.evict_nearest_expiration();
        }

        self.entries.insert(
            pid,
            CacheEntry {
                snapshot,
                inserted_at: now,
                expires_at: now + self.ttl,
            },
        );
        evicted
    }

    /// Linear scan for the entry expiring first
    fn evict_nearest_expiration(&mut self) -> Option<Pid> {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(pid, _)| *pid)?;
        self.entries.remove(&victim);
        self.evictions += 1;
        Some(victim)
    }

    pub fn remove(&mut self, pid: Pid) -> bool {
        self.entries.remove(&pid).is_some()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.entries.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self, now: Instant) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let ages = self
            .entries
            .values()
            .map(|entry| now.saturating_duration_since(entry.inserted_at));

        CacheStats {
            size: self.entries.len(),
            max_size: self.max_size,
            hits,
            misses,
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
            evictions: self.evictions,
            oldest_entry_age: ages.clone().max(),
            newest_entry_age: ages.min(),
        }
    }
}
