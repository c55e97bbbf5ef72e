/// Bounded in-memory cache of final result lists.
///
/// Keyed by (normalized query, canonical filters, result size). Backed by
/// [`moka`] with capacity and TTL eviction; reads never take a lock. One cache
/// lives inside each catalogue generation, so a reload starts empty.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;

use super::ValidatedFilters;
use crate::config::CacheConfig;
use crate::search::FinalResult;

/// Composite cache key: canonical query + canonical filters + limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    filters: ValidatedFilters,
    limit: usize,
}

impl CacheKey {
    /// `query` must already be the output of [`super::normalize`].
    pub fn new(query: &str, filters: &ValidatedFilters, limit: usize) -> Self {
        CacheKey {
            query: query.to_string(),
            filters: filters.clone(),
            limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub results: Vec<FinalResult>,
    pub created_at: DateTime<Utc>,
}

pub struct ResultCache {
    inner: Option<Cache<CacheKey, Arc<CacheEntry>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        let inner = config.enabled.then(|| {
            Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(Duration::from_secs(config.ttl_secs))
                .build()
        });
        ResultCache {
            inner,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a key, counting the hit or miss. A disabled cache counts nothing.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let cache = self.inner.as_ref()?;
        match cache.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: CacheKey, results: Vec<FinalResult>) {
        if let Some(cache) = &self.inner {
            let entry = CacheEntry {
                results,
                created_at: Utc::now(),
            };
            cache.insert(key, Arc::new(entry));
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.as_ref().is_some_and(|c| c.contains_key(key))
    }

    /// Current number of live entries, after flushing pending maintenance.
    pub fn entry_count(&self) -> u64 {
        match &self.inner {
            Some(cache) => {
                cache.run_pending_tasks();
                cache.entry_count()
            }
            None => 0,
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{normalize, SearchFilters};

    fn key(query: &str) -> CacheKey {
        CacheKey::new(&normalize(query), &ValidatedFilters::default(), 20)
    }

    #[test]
    fn test_cache_key_collapses_variants() {
        assert_eq!(key("paracetamol tablet"), key("Tablet PARACETAMOL"));
        assert_ne!(key("paracetamol"), key("ibuprofen"));
    }

    #[test]
    fn test_cache_key_includes_filters_and_limit() {
        let strip = SearchFilters::default().packaging_type(" STRIP").validate().unwrap();
        let strip2 = SearchFilters::default().packaging_type("strip").validate().unwrap();
        let q = normalize("dolo");
        assert_eq!(CacheKey::new(&q, &strip, 20), CacheKey::new(&q, &strip2, 20));
        assert_ne!(CacheKey::new(&q, &strip, 20), CacheKey::new(&q, &ValidatedFilters::default(), 20));
        assert_ne!(CacheKey::new(&q, &strip, 20), CacheKey::new(&q, &strip, 10));
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let cache = ResultCache::new(&CacheConfig::default());
        assert!(cache.get(&key("dolo")).is_none());
        cache.insert(key("dolo"), Vec::new());
        assert!(cache.get(&key("dolo")).is_some());
        assert!(cache.get(&key("dolo")).is_some());
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_capacity_bound() {
        let config = CacheConfig {
            max_entries: 2,
            ..CacheConfig::default()
        };
        let cache = ResultCache::new(&config);
        for q in ["a1", "b2", "c3", "d4", "e5"] {
            cache.insert(key(q), Vec::new());
        }
        assert!(cache.entry_count() <= 2);
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = ResultCache::new(&CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        cache.insert(key("dolo"), Vec::new());
        assert!(cache.get(&key("dolo")).is_none());
        assert!(!cache.contains(&key("dolo")));
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.misses(), 0);
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let cache = ResultCache::new(&CacheConfig {
            ttl_secs: 1,
            ..CacheConfig::default()
        });
        cache.insert(key("dolo"), Vec::new());
        assert!(cache.contains(&key("dolo")));

        std::thread::sleep(Duration::from_millis(1500));
        assert!(!cache.contains(&key("dolo")));
        assert!(cache.get(&key("dolo")).is_none());
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.entry_count(), 0);
    }
}
