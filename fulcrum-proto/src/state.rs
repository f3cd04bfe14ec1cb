//! The state-store port — how session and attachment data persists
//! across runs.
//!
//! The session persistence backend, the attachment blob store, and the
//! memory service are all external collaborators (§1); this module only
//! defines the port the coordinator and the ReAct runtime call through.

use crate::{error::StateError, id::SessionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A namespace a key lives under.
#[non_exhaustive]
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Scope {
    /// Keyed to one conversation session.
    Session(SessionId),
    /// Not keyed to any session — shared across the process.
    Global,
    /// Backend-defined namespace, for ports that need a finer grain.
    Custom(String),
}

/// CRUD + search + list over session-scoped state.
///
/// Deliberately minimal, mirroring the read/write asymmetry the
/// ReAct runtime relies on: the runtime owns `TaskState` directly and
/// only reaches this port to load the session on `prepare` and persist
/// it on `persist` (§4.6 steps 1 and 9).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a value by key within a scope. `None` if the key doesn't exist.
    async fn read(&self, scope: &Scope, key: &str) -> Result<Option<serde_json::Value>, StateError>;

    /// Write a value. Creates or overwrites.
    async fn write(&self, scope: &Scope, key: &str, value: serde_json::Value) -> Result<(), StateError>;

    /// Delete a value. No-op if the key doesn't exist.
    async fn delete(&self, scope: &Scope, key: &str) -> Result<(), StateError>;

    /// List keys under a prefix within a scope.
    async fn list(&self, scope: &Scope, prefix: &str) -> Result<Vec<String>, StateError>;

    /// Semantic search within a scope. Backends that don't support
    /// search return an empty vec, not an error.
    async fn search(&self, scope: &Scope, query: &str, limit: usize) -> Result<Vec<SearchResult>, StateError>;
}

/// A search result from a state store query.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The key that matched.
    pub key: String,
    /// Relevance score (higher is more relevant).
    pub score: f64,
    /// Preview/snippet of the matched content.
    pub snippet: Option<String>,
}

impl SearchResult {
    /// Create a new search result.
    pub fn new(key: impl Into<String>, score: f64) -> Self {
        Self {
            key: key.into(),
            score,
            snippet: None,
        }
    }
}

/// Read-only view of a [`StateStore`], handed to the memory-refresh
/// path and to anything that should be able to query but never write.
#[async_trait]
pub trait StateReader: Send + Sync {
    /// Read a value by key within a scope.
    async fn read(&self, scope: &Scope, key: &str) -> Result<Option<serde_json::Value>, StateError>;

    /// List keys under a prefix within a scope.
    async fn list(&self, scope: &Scope, prefix: &str) -> Result<Vec<String>, StateError>;

    /// Semantic search within a scope.
    async fn search(&self, scope: &Scope, query: &str, limit: usize) -> Result<Vec<SearchResult>, StateError>;
}

/// Every StateStore is a StateReader.
#[async_trait]
impl<T: StateStore> StateReader for T {
    async fn read(&self, scope: &Scope, key: &str) -> Result<Option<serde_json::Value>, StateError> {
        StateStore::read(self, scope, key).await
    }

    async fn list(&self, scope: &Scope, prefix: &str) -> Result<Vec<String>, StateError> {
        StateStore::list(self, scope, prefix).await
    }

    async fn search(&self, scope: &Scope, query: &str, limit: usize) -> Result<Vec<SearchResult>, StateError> {
        StateStore::search(self, scope, query, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    #[derive(Default)]
    struct MapStore {
        data: RwLock<HashMap<String, serde_json::Value>>,
    }

    fn key(scope: &Scope, k: &str) -> String {
        format!("{scope:?}/{k}")
    }

    #[async_trait]
    impl StateStore for MapStore {
        async fn read(&self, scope: &Scope, key_: &str) -> Result<Option<serde_json::Value>, StateError> {
            Ok(self.data.read().unwrap().get(&key(scope, key_)).cloned())
        }

        async fn write(&self, scope: &Scope, key_: &str, value: serde_json::Value) -> Result<(), StateError> {
            self.data.write().unwrap().insert(key(scope, key_), value);
            Ok(())
        }

        async fn delete(&self, scope: &Scope, key_: &str) -> Result<(), StateError> {
            self.data.write().unwrap().remove(&key(scope, key_));
            Ok(())
        }

        async fn list(&self, _scope: &Scope, _prefix: &str) -> Result<Vec<String>, StateError> {
            Ok(vec![])
        }

        async fn search(&self, _scope: &Scope, _query: &str, _limit: usize) -> Result<Vec<SearchResult>, StateError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn store_is_its_own_reader() {
        let store = MapStore::default();
        let scope = Scope::Session(SessionId::new("s-1"));
        store.write(&scope, "k", serde_json::json!(1)).await.unwrap();
        let via_reader: &dyn StateReader = &store;
        let value = via_reader.read(&scope, "k").await.unwrap();
        assert_eq!(value, Some(serde_json::json!(1)));
    }

    #[tokio::test]
    async fn missing_key_returns_none_not_error() {
        let store = MapStore::default();
        let scope = Scope::Global;
        assert!(store.read(&scope, "missing").await.unwrap().is_none());
    }
}
