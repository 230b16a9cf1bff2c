//! Bounded store for rendered feed documents.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use super::keys::FeedCacheKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

struct StoredDocument {
    body: Arc<str>,
    expires_at: Instant,
}

/// LRU store keyed by the canonical feed request.
///
/// Documents are kept as shared strings so a hit never copies the body. An entry older
/// than the store's TTL counts as a miss and is dropped.
pub struct FeedStore {
    documents: Mutex<LruCache<FeedCacheKey, StoredDocument>>,
    ttl: Duration,
}

impl FeedStore {
    pub fn new(limit: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            documents: Mutex::new(LruCache::new(limit)),
            ttl,
        }
    }

    pub fn get(&self, key: &FeedCacheKey) -> Option<Arc<str>> {
        let mut documents = mutex_lock(&self.documents, SOURCE, "get");
        let now = Instant::now();
        let lookup = documents
            .get(key)
            .map(|stored| (stored.expires_at > now).then(|| Arc::clone(&stored.body)));
        let document = match lookup {
            Some(Some(body)) => Some(body),
            Some(None) => {
                documents.pop(key);
                None
            }
            None => None,
        };
        drop(documents);

        match document {
            Some(document) => {
                counter!("scholia_feed_cache_hit_total").increment(1);
                Some(document)
            }
            None => {
                counter!("scholia_feed_cache_miss_total").increment(1);
                None
            }
        }
    }

    pub fn put(&self, key: FeedCacheKey, document: Arc<str>) {
        let stored = StoredDocument {
            body: document,
            expires_at: Instant::now() + self.ttl,
        };
        let mut documents = mutex_lock(&self.documents, SOURCE, "put");
        if let Some((evicted, _)) = documents.push(key.clone(), stored)
            && evicted != key
        {
            counter!("scholia_feed_cache_evict_total").increment(1);
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.documents, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
