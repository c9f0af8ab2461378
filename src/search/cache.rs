//! LRU cache of search results.
//!
//! Keys are the exact bit patterns of the query rows plus `k`, so a hit is
//! returned only for a byte-identical request and is bit-identical to what the
//! underlying search would have returned.

use super::{SearchResults, VectorSearch};
use crate::error::{IndexError, Result};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Cache configuration.
#[derive(Clone, Debug)]
pub struct CacheParams {
    /// Maximum cached requests; must be at least 1.
    pub capacity: usize,
}

impl Default for CacheParams {
    fn default() -> Self {
        Self { capacity: 128 }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Current number of entries.
    pub size: usize,
}

impl CacheStats {
    /// Returns the hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QueryKey {
    bits: Vec<u32>,
    k: usize,
}

impl QueryKey {
    fn new(queries: &[f32], k: usize) -> Self {
        Self {
            bits: queries.iter().map(|v| v.to_bits()).collect(),
            k,
        }
    }
}

struct CacheState {
    entries: LruCache<QueryKey, SearchResults>,
    stats: CacheStats,
}

/// A [`VectorSearch`] wrapper that memoizes results.
///
/// The lock guards only lookup and insert; the wrapped search runs unlocked,
/// so concurrent misses on the same key may both reach the inner index (the
/// second insert just refreshes the entry). Failed searches are never cached.
pub struct CachedSearch<S> {
    inner: S,
    state: Mutex<CacheState>,
}

impl<S: VectorSearch> CachedSearch<S> {
    pub fn new(inner: S, params: CacheParams) -> Result<Self> {
        let capacity = NonZeroUsize::new(params.capacity).ok_or_else(|| {
            IndexError::InvalidParameter("cache capacity must be greater than 0".to_string())
        })?;
        Ok(Self {
            inner,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        })
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            size: state.entries.len(),
            ..state.stats.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry; counters are kept.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    fn lookup(&self, key: &QueryKey) -> Option<SearchResults> {
        let mut state = self.state.lock();
        let cached = state.entries.get(key).cloned();
        match cached {
            Some(hit) => {
                state.stats.hits += 1;
                Some(hit)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    fn insert(&self, key: QueryKey, results: SearchResults) {
        let mut state = self.state.lock();
        if let Some((evicted, _)) = state.entries.push(key, results) {
            // push also returns the old value when the key was already present
            if !state.entries.contains(&evicted) {
                state.stats.evictions += 1;
            }
        }
    }
}

impl<S: VectorSearch> VectorSearch for CachedSearch<S> {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn search(&self, queries: &[f32], k: usize) -> Result<SearchResults> {
        let key = QueryKey::new(queries, k);
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }
        let results = self.inner.search(queries, k)?;
        self.insert(key, results.clone());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        calls: AtomicUsize,
    }

    impl VectorSearch for Counting {
        fn dimension(&self) -> usize {
            2
        }

        fn search(&self, queries: &[f32], k: usize) -> Result<SearchResults> {
            if queries.len() % 2 != 0 {
                return Err(IndexError::DimensionMismatch {
                    expected: 2,
                    actual: queries.len(),
                });
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out = SearchResults::default();
            for q in queries.chunks_exact(2) {
                out.push_row(vec![q[0]; k], (0..k as u64).collect());
            }
            Ok(out)
        }
    }

    fn cached(capacity: usize) -> CachedSearch<Counting> {
        CachedSearch::new(
            Counting {
                calls: AtomicUsize::new(0),
            },
            CacheParams { capacity },
        )
        .unwrap()
    }

    #[test]
    fn second_identical_query_does_not_reach_inner() {
        let cache = cached(4);
        let first = cache.search(&[1.0, 2.0], 3).unwrap();
        let second = cache.search(&[1.0, 2.0], 3).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn k_is_part_of_the_key() {
        let cache = cached(4);
        cache.search(&[1.0, 2.0], 3).unwrap();
        cache.search(&[1.0, 2.0], 4).unwrap();
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let cache = cached(2);
        cache.search(&[1.0, 0.0], 1).unwrap();
        cache.search(&[2.0, 0.0], 1).unwrap();
        cache.search(&[1.0, 0.0], 1).unwrap();
        cache.search(&[3.0, 0.0], 1).unwrap();
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.len(), 2);

        cache.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 3);
        cache.search(&[2.0, 0.0], 1).unwrap();
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = cached(2);
        assert!(cache.search(&[1.0], 1).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result = CachedSearch::new(
            Counting {
                calls: AtomicUsize::new(0),
            },
            CacheParams { capacity: 0 },
        );
        assert!(result.is_err());
    }

    #[test]
    fn concurrent_callers_share_one_consistent_cache() {
        const THREADS: usize = 8;
        const CALLS: usize = 50;
        let cache = Arc::new(cached(4));
        let fresh = Counting {
            calls: AtomicUsize::new(0),
        };

        std::thread::scope(|scope| {
            for t in 0..THREADS {
                let cache = Arc::clone(&cache);
                let fresh = &fresh;
                scope.spawn(move || {
                    for i in 0..CALLS {
                        let query = [((t + i) % 6) as f32, 0.0];
                        let k = 1 + i % 2;
                        let got = cache.search(&query, k).unwrap();
                        assert_eq!(got, fresh.search(&query, k).unwrap());
                    }
                });
            }
        });

        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, (THREADS * CALLS) as u64);
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst) as u64, stats.misses);
        assert!(cache.len() <= 4);
    }

    #[test]
    fn clear_empties_but_keeps_counters() {
        let cache = cached(2);
        cache.search(&[1.0, 0.0], 1).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }
}
