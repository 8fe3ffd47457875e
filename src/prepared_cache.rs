//! Session-wide prepared-statement cache (`spec.md` §3, §4.6): bounded,
//! LRU-evicted, keyed by query text, with concurrent prepares of identical
//! text collapsed into one server round-trip.
use std::{collections::HashMap, future::Future, num::NonZeroUsize, sync::Arc};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{error::Result, statement::PreparedStatement};

const DEFAULT_CAPACITY: usize = 512;

/// A second caller's channel onto the first caller's in-flight `PREPARE`.
type Waiters = broadcast::Sender<Arc<PreparedStatement>>;

pub struct PreparedCache {
    cache: Mutex<LruCache<Arc<str>, Arc<PreparedStatement>>>,
    in_flight: Mutex<HashMap<Arc<str>, Waiters>>,
}

impl PreparedCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self { cache: Mutex::new(LruCache::new(capacity)), in_flight: Mutex::new(HashMap::new()) }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A cache hit with no server round-trip.
    pub fn get(&self, query: &str) -> Option<Arc<PreparedStatement>> {
        self.cache.lock().get(query).cloned()
    }

    /// Overwrite a cache entry, used after a coordinator reports `UNPREPARED`
    /// and the statement is re-prepared against it.
    pub fn put(&self, query: Arc<str>, prepared: Arc<PreparedStatement>) {
        self.cache.lock().put(query, prepared);
    }

    /// Resolve `query` against the cache, collapsing concurrent identical
    /// prepares into a single call to `prepare` (`spec.md` §3's invariant:
    /// "concurrent prepares of the same text collapse to one server
    /// round-trip").
    pub async fn get_or_prepare<F, Fut>(&self, query: Arc<str>, prepare: F) -> Result<Arc<PreparedStatement>>
    where
        F: FnOnce(Arc<str>) -> Fut,
        Fut: Future<Output = Result<PreparedStatement>>,
    {
        if let Some(hit) = self.get(&query) {
            return Ok(hit);
        }

        let mut receiver = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&query) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _rx) = broadcast::channel(1);
                    in_flight.insert(query.clone(), tx);
                    None
                }
            }
        };

        if let Some(receiver) = receiver.as_mut() {
            return receiver
                .recv()
                .await
                .map_err(|_| crate::error::Error::internal("concurrent PREPARE failed upstream"));
        }

        let result = prepare(query.clone()).await;

        let tx = self.in_flight.lock().remove(&query);
        match result {
            Ok(prepared) => {
                let prepared = Arc::new(prepared);
                self.cache.lock().put(query, prepared.clone());
                if let Some(tx) = tx {
                    let _ = tx.send(prepared.clone());
                }
                Ok(prepared)
            }
            Err(err) => {
                // Dropping `tx` here closes the channel; waiters see a
                // `RecvError` and surface their own upstream-failure error.
                drop(tx);
                Err(err)
            }
        }
    }
}

impl Default for PreparedCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::types::CqlType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fake_prepared(query: &str) -> PreparedStatement {
        PreparedStatement {
            id: vec![1, 2, 3],
            query: query.into(),
            param_types: vec![CqlType::Int],
            result_columns: Vec::new(),
            partition_key_indices: Vec::new(),
        }
    }

    #[tokio::test]
    async fn caches_after_first_prepare() {
        let cache = PreparedCache::new(8);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let prepared = cache
            .get_or_prepare(Arc::from("SELECT 1"), move |q| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(fake_prepared(&q))
                }
            })
            .await
            .unwrap();
        assert_eq!(prepared.query.as_ref(), "SELECT 1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let hit = cache.get("SELECT 1").unwrap();
        assert_eq!(hit.id, prepared.id);
    }

    #[tokio::test]
    async fn concurrent_prepares_of_same_text_collapse() {
        let cache = Arc::new(PreparedCache::new(8));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_prepare(Arc::from("SELECT * FROM t"), move |q| {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                            Ok(fake_prepared(&q))
                        }
                    })
                    .await
            }));
        }

        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
