//! Bounded LRU + TTL cache for diagnosis results
//!
//! Entries expire lazily: an entry older than its TTL is dropped when it is
//! read. Capacity is enforced on write by evicting the least recently used
//! entry. All mutation happens under one lock, so the map can never grow past
//! its capacity even with concurrent writers (last writer wins on a key).

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::types::DiagnosisRequest;

/// Cached payload with its bookkeeping
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    pub inserted_at: Instant,
    pub ttl: Duration,
    /// Logical clock of the last read or write, for LRU ordering
    last_used: u64,
}

impl<T> CacheEntry<T> {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    clock: u64,
}

impl<T> Inner<T> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// LRU + TTL response cache
pub struct ResponseCache<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    ttl: Duration,

    /// Stats for logging
    hits: AtomicUsize,
    misses: AtomicUsize,
    evictions: AtomicUsize,
    expirations: AtomicUsize,
}

impl<T: Clone> ResponseCache<T> {
    /// Create a cache; a capacity of zero is raised to one
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                clock: 0,
            }),
            capacity: capacity.max(1),
            ttl,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            evictions: AtomicUsize::new(0),
            expirations: AtomicUsize::new(0),
        }
    }

    /// Get a live entry, dropping it if its TTL has passed
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let tick = inner.tick();

        let expired = match inner.entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                entry.last_used = tick;
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "Cache HIT");
                return Some(entry.value.clone());
            }
            None => false,
        };

        if expired {
            inner.entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "Cache STALE (ttl elapsed)");
        } else {
            tracing::debug!(key, "Cache MISS");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value, evicting the least recently used entry if full
    pub fn insert(&self, key: String, value: T) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let tick = inner.tick();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %oldest, "Cache EVICT (size limit)");
            }
        }

        tracing::debug!(key = %key, "Cache PUT");
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                ttl: self.ttl,
                last_used: tick,
            },
        );
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics for logging
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

/// Cache statistics for logging
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
    pub expirations: usize,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {:.1}% hit rate | {}/{} hits/misses | {} entries | {} evicted, {} expired",
            self.hit_rate(),
            self.hits,
            self.misses,
            self.entries,
            self.evictions,
            self.expirations,
        )
    }
}

/// Derive the cache key for a request
///
/// Symptoms are trimmed, lower-cased, sorted and de-duplicated so that
/// reordered or re-cased submissions of the same problem share one entry.
pub fn cache_key(request: &DiagnosisRequest) -> String {
    let mut symptoms: Vec<String> = request
        .symptom_list()
        .into_iter()
        .map(normalize_text)
        .collect();
    symptoms.sort();
    symptoms.dedup();

    let truck = &request.truck;
    let canonical = format!(
        "{}|{}|{}|{}|{}|{}|{}",
        normalize_text(&truck.make),
        normalize_text(&truck.model),
        truck.year,
        normalize_text(&truck.engine),
        symptoms.join(";"),
        request.urgency.as_str(),
        request.context_text().map(normalize_text).unwrap_or_default(),
    );

    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// Lower-case and collapse internal whitespace
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TruckInfo, Urgency};

    fn request(symptoms: &[&str]) -> DiagnosisRequest {
        DiagnosisRequest {
            truck: TruckInfo {
                make: "Freightliner".into(),
                model: "Cascadia".into(),
                year: 2018,
                engine: "Detroit DD15".into(),
            },
            symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
            context: None,
            urgency: Urgency::Medium,
        }
    }

    #[test]
    fn test_key_ignores_symptom_order_and_case() {
        let a = cache_key(&request(&["Black smoke", "Loss of power"]));
        let b = cache_key(&request(&["loss of  power ", "BLACK SMOKE"]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_depends_on_urgency_and_truck() {
        let base = request(&["Black smoke"]);
        let mut urgent = base.clone();
        urgent.urgency = Urgency::High;
        let mut other_truck = base.clone();
        other_truck.truck.year = 2020;

        assert_ne!(cache_key(&base), cache_key(&urgent));
        assert_ne!(cache_key(&base), cache_key(&other_truck));
    }

    #[test]
    fn test_insert_past_capacity_evicts_oldest() {
        let cache = ResponseCache::new(3, Duration::from_secs(60));
        for i in 0..3 {
            cache.insert(format!("k{i}"), i);
        }
        cache.insert("k3".to_string(), 3);

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("k0"));
        assert!(cache.contains("k1") && cache.contains("k2") && cache.contains("k3"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_read_refreshes_lru_position() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("c".to_string(), 3);

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        cache.insert("a".to_string(), 10);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_expired_entry_is_removed_on_read() {
        let cache = ResponseCache::new(4, Duration::from_millis(20));
        cache.insert("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_concurrent_inserts_respect_capacity() {
        let cache = std::sync::Arc::new(ResponseCache::new(8, Duration::from_secs(60)));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        cache.insert(format!("{t}-{i}"), i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 8);
    }

    #[test]
    fn test_stats_display() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        cache.insert("a".to_string(), 1);
        cache.get("a");
        cache.get("missing");
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!(stats.to_string().starts_with("Cache: 50.0% hit rate"));
    }
}
