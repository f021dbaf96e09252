use super::PreparedStatement;
use crate::Result;
use crate::collections::LruCache;
use crate::collections::LruStats;
use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// cache accounting shared across a pool's connections
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    live: AtomicI64,
}

/// the view `cache_stats` reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cached_statements: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheCounters {
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            cached_statements: self.live.load(Ordering::Relaxed).max(0) as u64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// per-connection LRU of prepared-statement prototypes keyed by SQL
/// text. the engine-side compiled statements live in the connection's
/// own pool, sized identically, so an eviction here retires the
/// compiled statement there as well.
#[derive(Debug)]
pub struct StatementCache {
    lru: LruCache<String, PreparedStatement>,
    counters: Arc<CacheCounters>,
}

impl StatementCache {
    pub fn new(capacity: usize, counters: Arc<CacheCounters>) -> Result<Self> {
        Ok(Self {
            lru: LruCache::new(capacity)?,
            counters,
        })
    }

    /// hit hands back the prototype with bindings reset
    pub fn lookup(&mut self, sql: &str) -> Option<PreparedStatement> {
        let key = sql.to_string();
        match self.lru.get(&key) {
            Some(prototype) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                let mut statement = prototype.clone();
                statement.clear_bindings();
                Some(statement)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&mut self, statement: PreparedStatement) {
        let key = statement.sql().to_string();
        if self.lru.is_full() && !self.lru.contains(&key) {
            // the LRU entry is about to be finalized
            self.counters.live.fetch_sub(1, Ordering::Relaxed);
        }
        if self.lru.put(key, statement) {
            self.counters.live.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn clear(&mut self) {
        self.counters
            .live
            .fetch_sub(self.lru.len() as i64, Ordering::Relaxed);
        self.lru.clear();
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lru.capacity()
    }

    /// this connection's own hit/miss/eviction view
    pub fn stats(&self) -> LruStats {
        self.lru.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(sql: &str) -> PreparedStatement {
        PreparedStatement::new(sql.to_string(), 1, 0)
    }

    #[test]
    fn miss_then_hit() {
        let counters = Arc::new(CacheCounters::default());
        let mut cache = StatementCache::new(4, counters.clone()).unwrap();
        assert!(cache.lookup("SELECT 1").is_none());
        cache.insert(statement("SELECT 1"));
        assert!(cache.lookup("SELECT 1").is_some());
        let stats = counters.snapshot();
        assert_eq!((stats.hits, stats.misses, stats.cached_statements), (1, 1, 1));
    }

    #[test]
    fn hit_resets_bindings() {
        let counters = Arc::new(CacheCounters::default());
        let mut cache = StatementCache::new(4, counters).unwrap();
        let mut stmt = PreparedStatement::new("SELECT ?1".to_string(), 1, 1);
        stmt.bind(1, 42i64).unwrap();
        cache.insert(stmt);
        let fresh = cache.lookup("SELECT ?1").unwrap();
        assert!(fresh.bindings().is_empty());
    }

    #[test]
    fn eviction_keeps_live_count_straight() {
        let counters = Arc::new(CacheCounters::default());
        let mut cache = StatementCache::new(2, counters.clone()).unwrap();
        cache.insert(statement("a"));
        cache.insert(statement("b"));
        cache.insert(statement("c"));
        assert_eq!(cache.len(), 2);
        assert_eq!(counters.snapshot().cached_statements, 2);
        cache.clear();
        assert_eq!(counters.snapshot().cached_statements, 0);
    }

    #[test]
    fn reinsert_does_not_double_count() {
        let counters = Arc::new(CacheCounters::default());
        let mut cache = StatementCache::new(2, counters.clone()).unwrap();
        cache.insert(statement("a"));
        cache.insert(statement("a"));
        assert_eq!(counters.snapshot().cached_statements, 1);
    }
}
