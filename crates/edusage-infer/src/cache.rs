//! LRU cache for query embeddings.
//!
//! Chat questions repeat (students retry, the UI resends), and every miss is
//! an HTTP round trip to the embedding provider.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use ndarray::Array1;
use parking_lot::Mutex;

pub struct QueryCache {
    inner: Mutex<Lru>,
}

struct Lru {
    entries: HashMap<String, (Array1<f32>, Instant)>,
    /// Least recently used at the front.
    recency: VecDeque<String>,
    capacity: usize,
    ttl: Duration,
}

impl Lru {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
    }

    fn forget(&mut self, key: &str) {
        self.entries.remove(key);
        self.recency.retain(|k| k != key);
    }
}

impl QueryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Lru {
                entries: HashMap::with_capacity(capacity),
                recency: VecDeque::with_capacity(capacity),
                capacity: capacity.max(1),
                ttl,
            }),
        }
    }

    /// 500 entries, 1 hour.
    pub fn for_queries() -> Self {
        Self::new(500, Duration::from_secs(3600))
    }

    pub fn get(&self, query: &str) -> Option<Array1<f32>> {
        let mut lru = self.inner.lock();
        let ttl = lru.ttl;
        let expired = lru.entries.get(query)?.1.elapsed() >= ttl;
        if expired {
            lru.forget(query);
            return None;
        }
        let embedding = lru.entries.get(query).map(|(e, _)| e.clone());
        lru.touch(query);
        embedding
    }

    pub fn put(&self, query: &str, embedding: Array1<f32>) {
        let mut lru = self.inner.lock();
        if lru.entries.contains_key(query) {
            lru.touch(query);
        } else {
            while lru.entries.len() >= lru.capacity {
                match lru.recency.pop_front() {
                    Some(oldest) => {
                        lru.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
            lru.recency.push_back(query.to_string());
        }
        lru.entries
            .insert(query.to_string(), (embedding, Instant::now()));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
