//! Bounded caches for embeddings and query results
//!
//! Two stores with different lifetimes: the embedding cache is bounded and
//! evicts in insertion order, the query-result cache expires entries on a
//! fixed TTL. Both hand out independent copies on every read and write, so
//! caller mutation of a returned value never aliases cache contents, and
//! both notify registered observers instead of broadcasting globally.

use crate::knowledge::QueryResult;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default embedding cache capacity
pub const DEFAULT_EMBEDDING_CAPACITY: usize = 512;

/// Default query-result TTL (5 minutes)
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(300);

/// Cache lifecycle notification delivered to registered observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Hit { key: String },
    Miss { key: String },
    Evicted { key: String },
    Expired { key: String },
}

type Observer = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Deterministic, non-cryptographic key for normalized text
///
/// Collisions are tolerated as an accepted approximation; the cache only
/// ever trades a wrong hit for a recomputation upstream.
pub fn text_key(text: &str) -> String {
    let normalized = text.trim().to_lowercase();
    let mut hasher = DefaultHasher::new();
    normalized.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Bounded embedding store with insertion-order eviction
///
/// Eviction removes the earliest-inserted entry when at capacity. Reads do
/// not refresh position, so this is a FIFO approximation of LRU rather than
/// true least-recently-used; an intentional simplification.
pub struct EmbeddingCache {
    entries: HashMap<String, Vec<f32>>,
    insertion_order: VecDeque<String>,
    capacity: usize,
    observers: Vec<Observer>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EMBEDDING_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            capacity: capacity.max(1),
            observers: Vec::new(),
        }
    }

    /// Register an observer for hit/miss/evict events
    pub fn on_event(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    fn notify(&self, event: CacheEvent) {
        for observer in &self.observers {
            observer(&event);
        }
    }

    /// Look up the embedding for `text`, returning an independent copy
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = text_key(text);
        match self.entries.get(&key) {
            Some(embedding) => {
                self.notify(CacheEvent::Hit { key });
                Some(embedding.clone())
            }
            None => {
                self.notify(CacheEvent::Miss { key });
                None
            }
        }
    }

    /// Store a copy of `embedding` under the key for `text`
    ///
    /// Returns true if an existing entry was evicted to make room.
    pub fn put(&mut self, text: &str, embedding: &[f32]) -> bool {
        let key = text_key(text);
        if self.entries.contains_key(&key) {
            self.entries.insert(key, embedding.to_vec());
            return false;
        }

        let mut evicted = false;
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.entries.remove(&oldest);
                self.notify(CacheEvent::Evicted { key: oldest });
                evicted = true;
            }
        }

        self.insertion_order.push_back(key.clone());
        self.entries.insert(key, embedding.to_vec());
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

struct TimedEntry {
    value: QueryResult,
    inserted_at: Instant,
}

/// Query-result store with TTL expiry measured from insertion
///
/// Expiry is lazy: `get` on a stale entry deletes it and reports a miss. No
/// background sweep runs; `sweep` exists for maintenance and tests.
pub struct QueryResultCache {
    entries: HashMap<String, TimedEntry>,
    ttl: Duration,
    observers: Vec<Observer>,
}

impl QueryResultCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_RESULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            observers: Vec::new(),
        }
    }

    /// Register an observer for hit/miss/expiry events
    pub fn on_event(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    fn notify(&self, event: CacheEvent) {
        for observer in &self.observers {
            observer(&event);
        }
    }

    /// Look up a result, returning an independent copy if still live
    pub fn get(&mut self, key: &str) -> Option<QueryResult> {
        match self.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                self.notify(CacheEvent::Hit {
                    key: key.to_string(),
                });
                Some(entry.value.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                self.notify(CacheEvent::Expired {
                    key: key.to_string(),
                });
                None
            }
            None => {
                self.notify(CacheEvent::Miss {
                    key: key.to_string(),
                });
                None
            }
        }
    }

    /// Store a copy of `result` under `key`
    pub fn put(&mut self, key: impl Into<String>, result: &QueryResult) {
        self.entries.insert(
            key.into(),
            TimedEntry {
                value: result.clone(),
                inserted_at: Instant::now(),
            },
        );
    }

    /// Proactively remove every expired entry
    pub fn sweep(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.inserted_at.elapsed() > ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.entries.remove(&key);
            self.notify(CacheEvent::Expired { key });
        }
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for QueryResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{AnswerMethod, QueryIntent, QueryMetrics};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_result(answer: &str) -> QueryResult {
        QueryResult {
            answer: answer.to_string(),
            confidence: 0.8,
            intent: QueryIntent::Conversational,
            method: AnswerMethod::Generation,
            matched_chunks: vec!["c1".to_string()],
            processing_time: Duration::from_millis(12),
            metrics: QueryMetrics::default(),
        }
    }

    #[test]
    fn test_embedding_round_trip_is_a_copy() {
        let mut cache = EmbeddingCache::new();
        let embedding = vec![0.1, 0.2, 0.3];
        cache.put("some text", &embedding);

        let mut fetched = cache.get("some text").unwrap();
        assert_eq!(fetched, embedding);

        // Mutating the returned vector must not corrupt the cache
        fetched[0] = 99.0;
        assert_eq!(cache.get("some text").unwrap(), embedding);
    }

    #[test]
    fn test_key_normalizes_text() {
        let mut cache = EmbeddingCache::new();
        cache.put("  Hello World  ", &[1.0]);
        assert_eq!(cache.get("hello world"), Some(vec![1.0]));
    }

    #[test]
    fn test_eviction_removes_exactly_the_oldest() {
        let mut cache = EmbeddingCache::with_capacity(3);
        cache.put("a", &[1.0]);
        cache.put("b", &[2.0]);
        cache.put("c", &[3.0]);

        let evicted = cache.put("d", &[4.0]);
        assert!(evicted);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(vec![2.0]));
        assert_eq!(cache.get("c"), Some(vec![3.0]));
        assert_eq!(cache.get("d"), Some(vec![4.0]));
    }

    #[test]
    fn test_put_existing_key_does_not_evict() {
        let mut cache = EmbeddingCache::with_capacity(2);
        cache.put("a", &[1.0]);
        cache.put("b", &[2.0]);
        assert!(!cache.put("a", &[9.0]));
        assert_eq!(cache.get("a"), Some(vec![9.0]));
        assert_eq!(cache.get("b"), Some(vec![2.0]));
    }

    #[test]
    fn test_result_ttl_expiry() {
        let mut cache = QueryResultCache::with_ttl(Duration::from_millis(60));
        cache.put("q", &sample_result("5 years"));
        assert!(cache.get("q").is_some());

        std::thread::sleep(Duration::from_millis(90));
        assert!(cache.get("q").is_none());
        // Lazy expiry deleted the entry
        assert!(cache.is_empty());
    }

    #[test]
    fn test_result_sweep() {
        let mut cache = QueryResultCache::with_ttl(Duration::from_millis(60));
        cache.put("q1", &sample_result("a"));
        cache.put("q2", &sample_result("b"));
        assert_eq!(cache.sweep(), 0);

        std::thread::sleep(Duration::from_millis(90));
        cache.put("q3", &sample_result("c"));
        assert_eq!(cache.sweep(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_observers_see_hits_and_misses() {
        let hits = Arc::new(AtomicUsize::new(0));
        let misses = Arc::new(AtomicUsize::new(0));
        let mut cache = EmbeddingCache::new();
        let (h, m) = (hits.clone(), misses.clone());
        cache.on_event(Arc::new(move |event| match event {
            CacheEvent::Hit { .. } => {
                h.fetch_add(1, Ordering::SeqCst);
            }
            CacheEvent::Miss { .. } => {
                m.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }));

        cache.get("absent");
        cache.put("present", &[1.0]);
        cache.get("present");

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(misses.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn prop_round_trip_equal_by_content(
            text in "[a-zA-Z0-9 ]{1,40}",
            embedding in proptest::collection::vec(-10.0f32..10.0, 1..32),
        ) {
            let mut cache = EmbeddingCache::new();
            cache.put(&text, &embedding);
            prop_assert_eq!(cache.get(&text), Some(embedding));
        }
    }
}
