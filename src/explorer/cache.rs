use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bitcoin::Txid;
use tracing::debug;

/// Default number of raw transactions kept before the oldest is evicted
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Thread-safe raw transaction cache for avoiding duplicate explorer calls
///
/// Holds at most `capacity` transactions and evicts the oldest insert first.
/// A capacity of zero disables caching.
#[derive(Clone)]
pub struct RawTransactionCache {
    cache: Arc<Mutex<Entries>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

#[derive(Default)]
struct Entries {
    by_txid: HashMap<Txid, String>,
    order: VecDeque<Txid>,
    capacity: usize,
}

impl Entries {
    fn get(&self, txid: &Txid) -> Option<&String> {
        self.by_txid.get(txid)
    }

    fn len(&self) -> usize {
        self.by_txid.len()
    }

    fn insert(&mut self, txid: Txid, raw_hex: String) -> Option<Txid> {
        if self.capacity == 0 || self.by_txid.insert(txid, raw_hex).is_some() {
            return None;
        }
        self.order.push_back(txid);
        if self.order.len() <= self.capacity {
            return None;
        }
        let evicted = self.order.pop_front()?;
        self.by_txid.remove(&evicted);
        Some(evicted)
    }
}

impl Default for RawTransactionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl RawTransactionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Arc::new(Mutex::new(Entries {
                capacity,
                ..Entries::default()
            })),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        // Entries are written by a single insert, so a poisoned map is still consistent
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get a raw transaction hex from cache if it exists
    pub fn get(&self, txid: &Txid) -> Option<String> {
        match self.entries().get(txid) {
            Some(raw_hex) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for transaction: {}", txid);
                Some(raw_hex.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache miss for transaction: {}", txid);
                None
            }
        }
    }

    pub fn put(&self, txid: Txid, raw_hex: String) {
        if let Some(evicted) = self.entries().insert(txid, raw_hex) {
            debug!("Evicted transaction from cache: {}", evicted);
        }
        debug!("Cached transaction: {}", txid);
    }

    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn size(&self) -> usize {
        self.entries().len()
    }
}

/// Cache performance statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            (self.hits as f64 / (self.hits + self.misses) as f64) * 100.0
        }
    }
}
