#![deny(missing_docs)]
//! In-memory implementation of `fulcrum_proto::StateStore`.
//!
//! Uses a `HashMap` behind a `RwLock` for concurrent access. Scopes are
//! serialized to strings for use as key prefixes, providing full scope
//! isolation. Search always returns empty (no semantic search support
//! in the in-memory backend). Intended for tests and dev loops, not
//! for anything that must survive a process restart.

use async_trait::async_trait;
use fulcrum_proto::{Scope, SearchResult, StateError, StateStore};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory state store backed by a `HashMap` behind a `RwLock`.
///
/// Suitable for testing, prototyping, and single-process use cases
/// where persistence across restarts is not required.
pub struct MemoryStore {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn composite_key(scope: &Scope, key: &str) -> String {
    let scope_str = serde_json::to_string(scope).unwrap_or_else(|_| "unknown".to_string());
    format!("{scope_str}\0{key}")
}

fn extract_key<'a>(composite: &'a str, scope_prefix: &str) -> Option<&'a str> {
    composite
        .strip_prefix(scope_prefix)
        .and_then(|rest| rest.strip_prefix('\0'))
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn read(&self, scope: &Scope, key: &str) -> Result<Option<serde_json::Value>, StateError> {
        let ck = composite_key(scope, key);
        let data = self.data.read().await;
        Ok(data.get(&ck).cloned())
    }

    async fn write(&self, scope: &Scope, key: &str, value: serde_json::Value) -> Result<(), StateError> {
        let ck = composite_key(scope, key);
        let mut data = self.data.write().await;
        data.insert(ck, value);
        Ok(())
    }

    async fn delete(&self, scope: &Scope, key: &str) -> Result<(), StateError> {
        let ck = composite_key(scope, key);
        let mut data = self.data.write().await;
        data.remove(&ck);
        Ok(())
    }

    async fn list(&self, scope: &Scope, prefix: &str) -> Result<Vec<String>, StateError> {
        let scope_prefix = serde_json::to_string(scope).unwrap_or_else(|_| "unknown".to_string());
        let data = self.data.read().await;
        let keys: Vec<String> = data
            .keys()
            .filter_map(|ck| {
                extract_key(ck, &scope_prefix).and_then(|k| {
                    if k.starts_with(prefix) {
                        Some(k.to_string())
                    } else {
                        None
                    }
                })
            })
            .collect();
        Ok(keys)
    }

    async fn search(&self, _scope: &Scope, _query: &str, _limit: usize) -> Result<Vec<SearchResult>, StateError> {
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_proto::{SessionId, StateReader};
    use std::sync::Arc;

    fn session_scope(id: &str) -> Scope {
        Scope::Session(SessionId::new(id))
    }

    #[tokio::test]
    async fn write_then_read() {
        let store = MemoryStore::new();
        let scope = session_scope("s1");

        store.write(&scope, "key1", serde_json::json!("hello")).await.unwrap();

        let val = StateStore::read(&store, &scope, "key1").await.unwrap();
        assert_eq!(val, Some(serde_json::json!("hello")));
    }

    #[tokio::test]
    async fn read_missing_returns_none() {
        let store = MemoryStore::new();
        let scope = session_scope("s1");

        let val = StateStore::read(&store, &scope, "missing").await.unwrap();
        assert_eq!(val, None);
    }

    #[tokio::test]
    async fn overwrite_replaces_value() {
        let store = MemoryStore::new();
        let scope = session_scope("s1");

        store.write(&scope, "key1", serde_json::json!(1)).await.unwrap();
        store.write(&scope, "key1", serde_json::json!(2)).await.unwrap();

        let val = StateStore::read(&store, &scope, "key1").await.unwrap();
        assert_eq!(val, Some(serde_json::json!(2)));
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let store = MemoryStore::new();
        let scope = session_scope("s1");

        store.write(&scope, "key1", serde_json::json!("val")).await.unwrap();
        store.delete(&scope, "key1").await.unwrap();

        let val = StateStore::read(&store, &scope, "key1").await.unwrap();
        assert_eq!(val, None);
    }

    #[tokio::test]
    async fn delete_missing_is_noop() {
        let store = MemoryStore::new();
        let scope = session_scope("s1");
        store.delete(&scope, "nonexistent").await.unwrap();
    }

    #[tokio::test]
    async fn list_by_prefix() {
        let store = MemoryStore::new();
        let scope = session_scope("s1");

        store.write(&scope, "user:name", serde_json::json!("alice")).await.unwrap();
        store.write(&scope, "user:email", serde_json::json!("a@b.com")).await.unwrap();
        store.write(&scope, "config:theme", serde_json::json!("dark")).await.unwrap();

        let mut keys = StateStore::list(&store, &scope, "user:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["user:email", "user:name"]);
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let store = MemoryStore::new();
        let s1 = session_scope("s1");
        let s2 = session_scope("s2");

        store.write(&s1, "key", serde_json::json!("from-s1")).await.unwrap();
        store.write(&s2, "key", serde_json::json!("from-s2")).await.unwrap();

        assert_eq!(StateStore::read(&store, &s1, "key").await.unwrap(), Some(serde_json::json!("from-s1")));
        assert_eq!(StateStore::read(&store, &s2, "key").await.unwrap(), Some(serde_json::json!("from-s2")));
    }

    #[tokio::test]
    async fn search_returns_empty_vec() {
        let store = MemoryStore::new();
        let scope = session_scope("s1");
        store.write(&scope, "key1", serde_json::json!("hello")).await.unwrap();

        let results = StateStore::search(&store, &scope, "hello", 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn usable_as_arc_dyn_state_store() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let scope = session_scope("s1");

        store.write(&scope, "key", serde_json::json!("val")).await.unwrap();
        let val = store.read(&scope, "key").await.unwrap();
        assert_eq!(val, Some(serde_json::json!("val")));
    }

    #[tokio::test]
    async fn usable_as_dyn_state_reader() {
        let store = MemoryStore::new();
        let scope = session_scope("s1");
        store.write(&scope, "key", serde_json::json!("val")).await.unwrap();

        let reader: &dyn StateReader = &store;
        let val = reader.read(&scope, "key").await.unwrap();
        assert_eq!(val, Some(serde_json::json!("val")));
    }

    #[tokio::test]
    async fn concurrent_writes_to_different_keys() {
        let store = Arc::new(MemoryStore::new());
        let scope = session_scope("s1");

        let mut handles = vec![];
        for i in 0..10 {
            let store = Arc::clone(&store);
            let scope = scope.clone();
            handles.push(tokio::spawn(async move {
                store.write(&scope, &format!("key{i}"), serde_json::json!(i)).await.unwrap();
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        let store_ref: &dyn StateStore = store.as_ref();
        for i in 0..10 {
            let val = store_ref.read(&scope, &format!("key{i}")).await.unwrap();
            assert_eq!(val, Some(serde_json::json!(i)));
        }
    }
}
