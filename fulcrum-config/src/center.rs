//! [`ConfigCenter`] (C9): a cached, subscribable store of runtime
//! override snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

use crate::error::ConfigError;
use crate::merge::merge_overrides;
use crate::store::ConfigStore;

/// Default cache lifetime before `current_overrides` reloads from the
/// backing store (§4.9).
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Channel depth for each subscriber (§4.9 "buffered channel").
const SUBSCRIBER_BUFFER: usize = 16;

struct Cache {
    loaded_at: Instant,
    value: serde_json::Value,
}

/// A cached, subscribable store of runtime override snapshots.
///
/// `current_overrides` serves the cache while it's within the TTL and
/// reloads from the backing store once it goes stale.
/// `update_overrides` writes through to the store, replaces the
/// cache, and fans the new document out to every live subscriber with
/// a non-blocking send — a slow subscriber misses an individual
/// update rather than stalling the writer (§4.9).
pub struct ConfigCenter {
    store: Arc<dyn ConfigStore>,
    ttl: Duration,
    cache: Mutex<Option<Cache>>,
    tx: broadcast::Sender<serde_json::Value>,
}

impl ConfigCenter {
    /// Build a center backed by `store`, reloading at most once per
    /// `ttl`.
    pub fn new(store: Arc<dyn ConfigStore>, ttl: Duration) -> Self {
        let (tx, _rx) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            store,
            ttl,
            cache: Mutex::new(None),
            tx,
        }
    }

    /// Build a center with the default 30-second TTL.
    pub fn with_default_ttl(store: Arc<dyn ConfigStore>) -> Self {
        Self::new(store, DEFAULT_TTL)
    }

    /// The current override document. Served from cache within the
    /// TTL window; otherwise reloaded from the backing store.
    pub async fn current_overrides(&self) -> Result<serde_json::Value, ConfigError> {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.as_ref() {
            if entry.loaded_at.elapsed() < self.ttl {
                return Ok(entry.value.clone());
            }
        }
        let value = self.store.load().await?;
        *cache = Some(Cache {
            loaded_at: Instant::now(),
            value: value.clone(),
        });
        Ok(value)
    }

    /// Merge `overlay` onto the current document (nullable-pointer
    /// semantics), write the result through to the store, replace the
    /// cache, and notify subscribers.
    pub async fn update_overrides(
        &self,
        overlay: serde_json::Value,
    ) -> Result<serde_json::Value, ConfigError> {
        let base = self.current_overrides().await?;
        let merged = merge_overrides(&base, &overlay);
        self.store.save(&merged).await?;

        let mut cache = self.cache.lock().await;
        *cache = Some(Cache {
            loaded_at: Instant::now(),
            value: merged.clone(),
        });
        drop(cache);

        // Best-effort: no live subscribers is not an error.
        let _ = self.tx.send(merged.clone());
        Ok(merged)
    }

    /// Subscribe to override updates. The returned receiver lags
    /// (loses the oldest unread message) rather than blocking the
    /// writer if the subscriber falls behind; dropping it unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<serde_json::Value> {
        self.tx.subscribe()
    }
}

/// A closed, permanently-empty receiver, for optional wiring where no
/// [`ConfigCenter`] is configured. Every recv on it resolves
/// immediately to `Closed` rather than hanging.
pub fn closed_channel() -> broadcast::Receiver<serde_json::Value> {
    let (tx, rx) = broadcast::channel(1);
    drop(tx);
    rx
}

/// Subscribe through an optional center, falling back to
/// [`closed_channel`] when none is configured.
pub fn subscribe_optional(
    center: Option<&ConfigCenter>,
) -> broadcast::Receiver<serde_json::Value> {
    match center {
        Some(center) => center.subscribe(),
        None => closed_channel(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        loads: AtomicUsize,
        value: Mutex<serde_json::Value>,
    }

    impl CountingStore {
        fn new(value: serde_json::Value) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                value: Mutex::new(value),
            }
        }
    }

    #[async_trait]
    impl ConfigStore for CountingStore {
        async fn load(&self) -> Result<serde_json::Value, ConfigError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.lock().await.clone())
        }

        async fn save(&self, doc: &serde_json::Value) -> Result<(), ConfigError> {
            *self.value.lock().await = doc.clone();
            Ok(())
        }
    }

    #[tokio::test]
    async fn current_overrides_caches_within_ttl() {
        let store = Arc::new(CountingStore::new(serde_json::json!({"a": 1})));
        let center = ConfigCenter::new(store.clone(), Duration::from_secs(60));

        center.current_overrides().await.unwrap();
        center.current_overrides().await.unwrap();
        center.current_overrides().await.unwrap();

        assert_eq!(store.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn current_overrides_reloads_after_ttl_expires() {
        let store = Arc::new(CountingStore::new(serde_json::json!({"a": 1})));
        let center = ConfigCenter::new(store.clone(), Duration::from_millis(10));

        center.current_overrides().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        center.current_overrides().await.unwrap();

        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn update_overrides_writes_through_and_updates_cache() {
        let store = Arc::new(CountingStore::new(serde_json::json!({"timeout_ms": 1000})));
        let center = ConfigCenter::new(store.clone(), Duration::from_secs(60));

        center
            .update_overrides(serde_json::json!({"timeout_ms": 2000}))
            .await
            .unwrap();

        assert_eq!(
            center.current_overrides().await.unwrap(),
            serde_json::json!({"timeout_ms": 2000})
        );
        assert_eq!(
            *store.value.lock().await,
            serde_json::json!({"timeout_ms": 2000})
        );
    }

    #[tokio::test]
    async fn subscribers_are_notified_of_updates() {
        let store = Arc::new(CountingStore::new(serde_json::json!({})));
        let center = ConfigCenter::new(store, Duration::from_secs(60));
        let mut rx = center.subscribe();

        center
            .update_overrides(serde_json::json!({"a": 1}))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn update_with_no_subscribers_does_not_error() {
        let store = Arc::new(CountingStore::new(serde_json::json!({})));
        let center = ConfigCenter::new(store, Duration::from_secs(60));
        center
            .update_overrides(serde_json::json!({"a": 1}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn closed_channel_resolves_immediately() {
        let mut rx = closed_channel();
        let result = rx.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Closed)));
    }

    #[tokio::test]
    async fn subscribe_optional_falls_back_to_closed_channel() {
        let mut rx = subscribe_optional(None);
        assert!(rx.recv().await.is_err());
    }
}
