//! Single-flight lookup cache with per-entry expiry.
//!
//! Each key maps either to a ready value with its deadline or to the shared future of the
//! computation currently producing it. Concurrent callers for a key await the same future,
//! so a value is computed at most once at a time. Failures are never stored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::counter;
use tokio::time::Instant;
use tracing::debug;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::lookup";

type SharedComputation<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

enum Slot<V, E> {
    Ready { value: V, expires_at: Instant },
    Pending(SharedComputation<V, E>),
}

/// Key to value cache shared by every request of the process.
pub struct LookupCache<V, E> {
    name: &'static str,
    slots: Mutex<HashMap<String, Slot<V, E>>>,
}

impl<V, E> LookupCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// `name` labels log events and metrics.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the live value under `key` or runs `compute` to produce it.
    ///
    /// A computation already in flight for `key` is joined instead of started again. A
    /// successful result is stored until `ttl` elapses; an error is handed to every waiter
    /// and then dropped, so the next call retries.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let computation = {
            let mut slots = mutex_lock(&self.slots, SOURCE, "get_or_compute");
            let now = Instant::now();

            let in_flight = match slots.get(key) {
                Some(Slot::Ready { value, expires_at }) if *expires_at > now => {
                    counter!("scholia_lookup_cache_hit_total", "cache" => self.name).increment(1);
                    return Ok(value.clone());
                }
                Some(Slot::Pending(shared)) => Some(shared.clone()),
                _ => None,
            };

            match in_flight {
                Some(shared) => {
                    counter!("scholia_lookup_cache_coalesced_total", "cache" => self.name)
                        .increment(1);
                    debug!(
                        target = "scholia::cache::lookup",
                        cache = self.name,
                        key,
                        "joining in-flight computation"
                    );
                    shared
                }
                None => {
                    counter!("scholia_lookup_cache_miss_total", "cache" => self.name).increment(1);
                    prune_expired(&mut *slots, now);
                    let shared = compute().boxed().shared();
                    slots.insert(key.to_string(), Slot::Pending(shared.clone()));
                    shared
                }
            }
        };

        let result = computation.clone().await;
        self.settle(key, &computation, &result, ttl);
        result
    }

    // Replaces the pending slot only if it still holds this computation.
    fn settle(
        &self,
        key: &str,
        computation: &SharedComputation<V, E>,
        result: &Result<V, E>,
        ttl: Duration,
    ) {
        let mut slots = mutex_lock(&self.slots, SOURCE, "settle");
        let owned = matches!(
            slots.get(key),
            Some(Slot::Pending(current)) if current.ptr_eq(computation)
        );
        if !owned {
            return;
        }

        match result {
            Ok(value) => {
                slots.insert(
                    key.to_string(),
                    Slot::Ready {
                        value: value.clone(),
                        expires_at: Instant::now() + ttl,
                    },
                );
                debug!(
                    target = "scholia::cache::lookup",
                    cache = self.name,
                    key,
                    ttl_secs = ttl.as_secs(),
                    "stored computed value"
                );
            }
            Err(_) => {
                slots.remove(key);
                debug!(
                    target = "scholia::cache::lookup",
                    cache = self.name,
                    key,
                    "computation failed; nothing stored"
                );
            }
        }
    }

    #[cfg(test)]
    fn contains_ready(&self, key: &str) -> bool {
        let slots = mutex_lock(&self.slots, SOURCE, "contains_ready");
        matches!(
            slots.get(key),
            Some(Slot::Ready { expires_at, .. }) if *expires_at > Instant::now()
        )
    }
}

// Runs whenever a new computation starts.
fn prune_expired<V, E>(slots: &mut HashMap<String, Slot<V, E>>, now: Instant) {
    slots.retain(|_, slot| match slot {
        Slot::Ready { expires_at, .. } => *expires_at > now,
        Slot::Pending(_) => true,
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn counting(
        calls: &Arc<AtomicUsize>,
        value: u64,
    ) -> impl Future<Output = Result<u64, String>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(value)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_computation() {
        let cache: LookupCache<u64, String> = LookupCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            cache.get_or_compute("k", TTL, || counting(&calls, 7)),
            cache.get_or_compute("k", TTL, || counting(&calls, 8)),
            cache.get_or_compute("k", TTL, || counting(&calls, 9)),
        );

        assert_eq!((a, b, c), (Ok(7), Ok(7), Ok(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains_ready("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_compute_independently() {
        let cache: LookupCache<u64, String> = LookupCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.get_or_compute("a", TTL, || counting(&calls, 1)),
            cache.get_or_compute("b", TTL, || counting(&calls, 2)),
        );

        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn value_expires_after_ttl() {
        let cache: LookupCache<u64, String> = LookupCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.get_or_compute("k", TTL, || counting(&calls, 1)).await, Ok(1));
        assert_eq!(cache.get_or_compute("k", TTL, || counting(&calls, 2)).await, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert!(!cache.contains_ready("k"));

        assert_eq!(cache.get_or_compute("k", TTL, || counting(&calls, 2)).await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_reach_every_waiter_and_are_not_stored() {
        let cache: LookupCache<u64, String> = LookupCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<u64, String>("search offline".to_string())
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_compute("k", TTL, failing),
            cache.get_or_compute("k", TTL, failing),
        );
        assert_eq!(a, Err("search offline".to_string()));
        assert_eq!(b, Err("search offline".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.contains_ready("k"));

        assert_eq!(cache.get_or_compute("k", TTL, || counting(&calls, 5)).await, Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_caller_does_not_cancel_shared_computation() {
        let cache = Arc::new(LookupCache::<u64, String>::new("test"));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move { cache.get_or_compute("k", TTL, || counting(&calls, 3)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        first.abort();

        let value = cache.get_or_compute("k", TTL, || counting(&calls, 4)).await;
        assert_eq!(value, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_computation_drops_expired_values_of_other_keys() {
        let cache: LookupCache<u64, String> = LookupCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let _ = cache.get_or_compute("stale", TTL, || counting(&calls, 1)).await;
        let _ = cache
            .get_or_compute("fresh", TTL * 10, || counting(&calls, 2))
            .await;
        tokio::time::advance(TTL + Duration::from_secs(1)).await;

        let _ = cache.get_or_compute("new", TTL, || counting(&calls, 3)).await;

        let slots = cache.slots.lock().unwrap();
        assert!(!slots.contains_key("stale"));
        assert!(slots.contains_key("fresh"));
        assert!(slots.contains_key("new"));
    }
}
