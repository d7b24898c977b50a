//! GET response cache: bounded memory layer, optional SQLite layer, TTL,
//! in-flight de-duplication and stale-if-error.

use crate::storage::StorageHandle;
use anyhow::Context;
use lru::LruCache;
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;

const MIN_TTL_MS: i64 = 1_000;

type Shared = Arc<OnceCell<Result<Value, String>>>;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: i64,
}

struct Inner {
    memory: Mutex<LruCache<String, Entry>>,
    inflight: Mutex<HashMap<String, Shared>>,
    store: Option<StorageHandle>,
    stale_if_error: bool,
}

/// Cheap to clone; clones share both layers.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("store", &self.inner.store)
            .field("stale_if_error", &self.inner.stale_if_error)
            .finish_non_exhaustive()
    }
}

pub fn cache_key(url: &str) -> String {
    hex::encode(Sha1::digest(url.as_bytes()))
}

pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

impl ResponseCache {
    pub fn new(memory_entries: usize, store: Option<StorageHandle>, stale_if_error: bool) -> Self {
        let cap = NonZeroUsize::new(memory_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Inner {
                memory: Mutex::new(LruCache::new(cap)),
                inflight: Mutex::new(HashMap::new()),
                store,
                stale_if_error,
            }),
        }
    }

    /// Memory layer only.
    pub fn in_memory(memory_entries: usize) -> Self {
        Self::new(memory_entries, None, true)
    }

    /// Return a fresh cached value for `url`, or run `fetch` once for every
    /// concurrent caller asking for the same URL.
    pub async fn get_or_fetch<F, Fut>(&self, url: &str, ttl: Duration, fetch: F) -> anyhow::Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Value>>,
    {
        self.get_or_fetch_at(now_ms, url, ttl, fetch).await
    }

    async fn get_or_fetch_at<C, F, Fut>(
        &self,
        clock: C,
        url: &str,
        ttl: Duration,
        fetch: F,
    ) -> anyhow::Result<Value>
    where
        C: Fn() -> i64,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Value>>,
    {
        let key = cache_key(url);
        if let Some(v) = self.lookup(&key, clock(), false).await {
            tracing::debug!(url, "cache hit");
            return Ok(v);
        }

        let cell = {
            let mut inflight = self.lock_inflight();
            inflight.entry(key.clone()).or_default().clone()
        };

        let outcome = cell
            .get_or_init(|| async {
                match fetch().await {
                    Ok(v) => {
                        let now = clock();
                        let ttl_ms = i64::try_from(ttl.as_millis())
                            .unwrap_or(i64::MAX)
                            .max(MIN_TTL_MS);
                        self.store(&key, url, &v, now.saturating_add(ttl_ms), now).await;
                        Ok(v)
                    }
                    Err(e) => {
                        if self.inner.stale_if_error
                            && let Some(v) = self.lookup(&key, clock(), true).await
                        {
                            tracing::warn!(url, "serving stale response: {e:#}");
                            return Ok(v);
                        }
                        Err(format!("{e:#}"))
                    }
                }
            })
            .await
            .clone();

        {
            let mut inflight = self.lock_inflight();
            if inflight.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                inflight.remove(&key);
            }
        }

        outcome.map_err(|msg| anyhow::anyhow!(msg))
    }

    /// Wipe both layers. Returns the number of persisted rows removed.
    pub async fn clear(&self) -> anyhow::Result<usize> {
        self.lock_memory().clear();
        let Some(store) = self.inner.store.clone() else {
            return Ok(0);
        };
        tokio::task::spawn_blocking(move || store.clear_responses())
            .await
            .context("join cache clear")?
    }

    async fn lookup(&self, key: &str, now: i64, allow_stale: bool) -> Option<Value> {
        let cached = self.lock_memory().get(key).cloned();
        if let Some(entry) = cached
            && (allow_stale || entry.expires_at > now)
        {
            return Some(entry.value);
        }

        let store = self.inner.store.clone()?;
        let owned = key.to_string();
        let row = match tokio::task::spawn_blocking(move || store.get_response(&owned)).await {
            Ok(Ok(row)) => row?,
            Ok(Err(e)) => {
                tracing::warn!("read response cache: {e:#}");
                return None;
            }
            Err(e) => {
                tracing::warn!("join response cache read: {e}");
                return None;
            }
        };

        let (body, expires_at) = row;
        if !allow_stale && expires_at <= now {
            return None;
        }
        let value: Value = serde_json::from_str(&body).ok()?;
        self.lock_memory().put(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at,
            },
        );
        Some(value)
    }

    async fn store(&self, key: &str, url: &str, value: &Value, expires_at: i64, now: i64) {
        self.lock_memory().put(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at,
            },
        );

        let Some(store) = self.inner.store.clone() else {
            return;
        };
        let body = match serde_json::to_string(value) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("serialize cached response: {e}");
                return;
            }
        };
        let (key, url) = (key.to_string(), url.to_string());
        let res = tokio::task::spawn_blocking(move || {
            store.put_response(&key, &url, &body, expires_at, now)
        })
        .await;
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("write response cache: {e:#}"),
            Err(e) => tracing::warn!("join response cache write: {e}"),
        }
    }

    fn lock_memory(&self) -> std::sync::MutexGuard<'_, LruCache<String, Entry>> {
        self.inner
            .memory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_inflight(&self) -> std::sync::MutexGuard<'_, HashMap<String, Shared>> {
        self.inner
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const URL: &str = "https://api.example/episode/ep-1";

    #[tokio::test]
    async fn fresh_value_is_served_without_refetch() {
        let cache = ResponseCache::in_memory(8);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let v = cache
                .get_or_fetch(URL, Duration::from_secs(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"n": 1}))
                })
                .await
                .expect("fetch");
            assert_eq!(v, json!({"n": 1}));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_value_is_refetched_and_ttl_has_a_floor() {
        let cache = ResponseCache::in_memory(8);
        let now = AtomicUsize::new(10_000);
        let clock = || now.load(Ordering::SeqCst) as i64;

        cache
            .get_or_fetch_at(clock, URL, Duration::ZERO, || async { Ok(json!(1)) })
            .await
            .expect("first");

        now.store(10_500, Ordering::SeqCst);
        let v = cache
            .get_or_fetch_at(clock, URL, Duration::ZERO, || async { Ok(json!(2)) })
            .await
            .expect("within floor");
        assert_eq!(v, json!(1));

        now.store(11_000, Ordering::SeqCst);
        let v = cache
            .get_or_fetch_at(clock, URL, Duration::ZERO, || async { Ok(json!(3)) })
            .await
            .expect("expired");
        assert_eq!(v, json!(3));
    }

    #[tokio::test]
    async fn huge_ttl_saturates_instead_of_wrapping() {
        let cache = ResponseCache::in_memory(8);
        let now = AtomicUsize::new(10_000);
        let clock = || now.load(Ordering::SeqCst) as i64;

        cache
            .get_or_fetch_at(clock, URL, Duration::MAX, || async { Ok(json!(1)) })
            .await
            .expect("first");

        now.store(usize::MAX / 4, Ordering::SeqCst);
        let v = cache
            .get_or_fetch_at(clock, URL, Duration::MAX, || async { Ok(json!(2)) })
            .await
            .expect("still fresh");
        assert_eq!(v, json!(1));
    }

    #[tokio::test]
    async fn concurrent_gets_share_one_fetch() {
        let cache = ResponseCache::in_memory(8);
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, anyhow::Error>(json!("shared"))
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch(URL, Duration::from_secs(60), fetch(calls.clone())),
            cache.get_or_fetch(URL, Duration::from_secs(60), fetch(calls.clone())),
        );
        assert_eq!(a.expect("a"), json!("shared"));
        assert_eq!(b.expect("b"), json!("shared"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_serves_stale_value_when_allowed() {
        let cache = ResponseCache::in_memory(8);
        let now = AtomicUsize::new(0);
        let clock = || now.load(Ordering::SeqCst) as i64;

        cache
            .get_or_fetch_at(clock, URL, Duration::from_secs(1), || async { Ok(json!("old")) })
            .await
            .expect("seed");
        now.store(60_000, Ordering::SeqCst);

        let v = cache
            .get_or_fetch_at(clock, URL, Duration::from_secs(1), || async {
                Err(anyhow::anyhow!("HTTP 503"))
            })
            .await
            .expect("stale");
        assert_eq!(v, json!("old"));

        let strict = ResponseCache::new(8, None, false);
        let err = strict
            .get_or_fetch(URL, Duration::from_secs(1), || async {
                Err(anyhow::anyhow!("HTTP 503"))
            })
            .await
            .expect_err("no stale fallback");
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn persisted_layer_survives_a_new_instance_and_clears() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handle = StorageHandle::in_dir(dir.path());

        let first = ResponseCache::new(8, Some(handle.clone()), true);
        first
            .get_or_fetch(URL, Duration::from_secs(300), || async { Ok(json!({"kept": true})) })
            .await
            .expect("seed");

        let second = ResponseCache::new(8, Some(handle.clone()), true);
        let v = second
            .get_or_fetch(URL, Duration::from_secs(300), || async {
                Err(anyhow::anyhow!("should not fetch"))
            })
            .await
            .expect("from disk");
        assert_eq!(v, json!({"kept": true}));

        assert_eq!(second.clear().await.expect("clear"), 1);
        let third = ResponseCache::new(8, Some(handle), false);
        assert!(
            third
                .get_or_fetch(URL, Duration::from_secs(300), || async {
                    Err(anyhow::anyhow!("gone"))
                })
                .await
                .is_err()
        );
    }

    #[test]
    fn keys_are_sha1_hex() {
        let key = cache_key(URL);
        assert_eq!(key.len(), 40);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, cache_key("https://api.example/episode/ep-2"));
    }
}
