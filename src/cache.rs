//! Response cache with TTL-based eviction.
//!
//! Maps a query's identity to the PDU-suffix bytes of its response. The key
//! deliberately excludes the request id, so one cached response satisfies
//! every client polling the same object during the TTL; the response each
//! client receives is synthesized around its own request id.
//!
//! All access is serialized by a single std mutex. The mutex is never held
//! across an await point: lookups and inserts bracket the backend I/O
//! without enclosing it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::message::PduType;

/// Identity of a cacheable query.
///
/// Equality is componentwise and no field carries ordering semantics. Two
/// GetBulk requests with different max-repetitions encode different `data`
/// and therefore occupy different entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Routing token: the backend the query is destined for.
    pub backend_host: String,
    /// Client-visible community (post-split).
    pub community: Bytes,
    /// The `@` context suffix, empty if absent.
    pub community_index: Bytes,
    pub pdu_type: PduType,
    /// Raw PDU suffix of the request.
    pub data: Bytes,
}

#[derive(Debug, Clone)]
struct CacheValue {
    response_data: Bytes,
    inserted_at: Instant,
}

/// TTL keyed cache for backend responses.
///
/// An entry is fresh while `now - inserted_at <= ttl`. Stale entries are
/// invisible to [`lookup`](Self::lookup), which evicts them opportunistically;
/// the background sweeper bounds their lifetime at 2×TTL.
#[derive(Debug)]
pub struct Cache {
    entries: Mutex<HashMap<CacheKey, CacheValue>>,
    ttl: Duration,
}

impl Cache {
    /// Create an empty cache with the given entry TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Entry TTL (also the sweeper period).
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a fresh entry, evicting a stale one in passing.
    pub fn lookup(&self, key: &CacheKey) -> Option<Bytes> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(value) if value.inserted_at.elapsed() <= self.ttl => {
                Some(value.response_data.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a response, stamping it with the current time. Overwrites any
    /// prior entry under the same key.
    pub fn insert(&self, key: CacheKey, response_data: Bytes) {
        let value = CacheValue {
            response_data,
            inserted_at: Instant::now(),
        };
        self.entries.lock().unwrap().insert(key, value);
    }

    /// Drop all stale entries, returning how many were evicted.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, value| value.inserted_at.elapsed() <= self.ttl);
        before - entries.len()
    }

    /// Number of live entries (fresh or not yet swept).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Spawn the background sweeper, waking every TTL until cancelled.
    pub fn spawn_sweeper(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = self;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(cache.ttl);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tick.tick().await; // completes immediately

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!(target: "snmp_cache_proxy::cache", "sweeper stopped");
                        break;
                    }
                    _ = tick.tick() => {
                        let evicted = cache.sweep();
                        if evicted > 0 {
                            tracing::debug!(
                                target: "snmp_cache_proxy::cache",
                                evicted,
                                remaining = cache.len(),
                                "evicted stale cache entries"
                            );
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn key(host: &str, data: &[u8]) -> CacheKey {
        CacheKey {
            backend_host: host.to_string(),
            community: Bytes::copy_from_slice(host.as_bytes()),
            community_index: Bytes::new(),
            pdu_type: PduType::GetRequest,
            data: Bytes::copy_from_slice(data),
        }
    }

    #[test]
    fn insert_then_lookup_within_ttl() {
        let cache = Cache::new(Duration::from_secs(300));
        let k = key("router1", &[1, 2, 3]);
        cache.insert(k.clone(), Bytes::from_static(b"response"));
        assert_eq!(cache.lookup(&k).unwrap().as_ref(), b"response");
    }

    #[test]
    fn stale_entry_is_miss_and_removed() {
        let cache = Cache::new(Duration::from_millis(30));
        let k = key("router1", &[1]);
        cache.insert(k.clone(), Bytes::from_static(b"old"));
        sleep(Duration::from_millis(50));
        assert!(cache.lookup(&k).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn insert_overwrites() {
        let cache = Cache::new(Duration::from_secs(300));
        let k = key("router1", &[1]);
        cache.insert(k.clone(), Bytes::from_static(b"v1"));
        cache.insert(k.clone(), Bytes::from_static(b"v2"));
        assert_eq!(cache.lookup(&k).unwrap().as_ref(), b"v2");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn keys_distinguish_all_components() {
        let cache = Cache::new(Duration::from_secs(300));
        let base = key("router1", &[1]);

        let mut other_host = base.clone();
        other_host.backend_host = "router2".to_string();

        let mut other_index = base.clone();
        other_index.community_index = Bytes::from_static(b"@vrf-red");

        let mut other_type = base.clone();
        other_type.pdu_type = PduType::GetNextRequest;

        let mut other_data = base.clone();
        other_data.data = Bytes::from_static(&[2]);

        cache.insert(base.clone(), Bytes::from_static(b"base"));
        for miss in [&other_host, &other_index, &other_type, &other_data] {
            assert!(cache.lookup(miss).is_none());
        }
        assert_eq!(cache.lookup(&base).unwrap().as_ref(), b"base");
    }

    #[test]
    fn sweep_drops_only_stale() {
        let cache = Cache::new(Duration::from_millis(40));
        cache.insert(key("old", &[1]), Bytes::from_static(b"old"));
        sleep(Duration::from_millis(60));
        cache.insert(key("new", &[2]), Bytes::from_static(b"new"));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(&key("new", &[2])).is_some());
    }

    #[test]
    fn concurrent_readers_see_whole_values() {
        let cache = Arc::new(Cache::new(Duration::from_secs(300)));
        let k = key("router1", &[1]);

        let writers: Vec<_> = (0u8..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let k = k.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        cache.insert(k.clone(), Bytes::from(vec![i; 64]));
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let k = k.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if let Some(value) = cache.lookup(&k) {
                            // Never a torn value: all 64 bytes from one insert.
                            assert_eq!(value.len(), 64);
                            assert!(value.iter().all(|&b| b == value[0]));
                        }
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn sweeper_evicts_in_background() {
        let cache = Arc::new(Cache::new(Duration::from_millis(30)));
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&cache).spawn_sweeper(cancel.clone());

        cache.insert(key("router1", &[1]), Bytes::from_static(b"r"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
