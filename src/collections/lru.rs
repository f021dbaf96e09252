use crate::Error;
use crate::Result;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::hash::Hash;

/// hit/miss/eviction counters for a cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LruStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl LruStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// least-recently-used cache with a positive capacity
///
/// `put` inserts or refreshes to most-recently-used; `get` refreshes on
/// hit; insertion past capacity evicts the LRU entry. recency order is
/// a deque with the most recent key at the front.
#[derive(Debug, Clone)]
pub struct LruCache<K, V> {
    map: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
    stats: LruStats,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_parameter("cache capacity must be positive"));
        }
        Ok(Self {
            map: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
            stats: LruStats::default(),
        })
    }

    fn touch(&mut self, key: &K) {
        if let Some(position) = self.order.iter().position(|k| k == key) {
            if let Some(key) = self.order.remove(position) {
                self.order.push_front(key);
            }
        }
    }

    fn evict_lru(&mut self) {
        if let Some(oldest) = self.order.pop_back() {
            self.map.remove(&oldest);
            self.stats.evictions += 1;
        }
    }

    /// insert or refresh; true when a new entry was created
    pub fn put(&mut self, key: K, value: V) -> bool {
        if self.map.contains_key(&key) {
            self.map.insert(key.clone(), value);
            self.touch(&key);
            return false;
        }
        if self.map.len() == self.capacity {
            self.evict_lru();
        }
        self.order.push_front(key.clone());
        self.map.insert(key, value);
        true
    }

    /// lookup, refreshing recency on hit
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.map.contains_key(key) {
            self.stats.hits += 1;
            self.touch(key);
            self.map.get(key)
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// lookup without touching recency or counters
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.map.remove(key)?;
        if let Some(position) = self.order.iter().position(|k| k == key) {
            self.order.remove(position);
        }
        Some(value)
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
        self.stats = LruStats::default();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
    pub fn is_full(&self) -> bool {
        self.map.len() >= self.capacity
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn stats(&self) -> LruStats {
        self.stats
    }

    /// keys in recency order, most recent first
    pub fn keys(&self) -> Vec<K> {
        self.order.iter().cloned().collect()
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        for key in self.order.iter() {
            if let Some(value) = self.map.get(key) {
                f(key, value);
            }
        }
    }

    /// shrink or grow capacity, truncating from the LRU end
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(Error::invalid_parameter("cache capacity must be positive"));
        }
        self.capacity = capacity;
        while self.map.len() > self.capacity {
            self.evict_lru();
        }
        Ok(())
    }
}
