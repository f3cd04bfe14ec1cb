//! A [`SessionStore`] built on the shared [`fulcrum_proto::StateStore`]
//! seam, rather than a bespoke persistence layer.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use fulcrum_proto::{Scope, SessionId, StateStore};

use crate::error::CoordinatorError;
use crate::ports::{SessionRecord, SessionStore};

/// Key under which the session record is stored, within the
/// session's own `Scope::Session` namespace.
const RECORD_KEY: &str = "session_record";

/// A [`SessionStore`] that keeps one [`SessionRecord`] per session,
/// serialized into any `StateStore` (memory-backed, file-backed, or
/// whatever a deployment wires up).
pub struct StateStoreSessions {
    store: Arc<dyn StateStore>,
}

impl StateStoreSessions {
    /// Wrap `store`, using it as the session record backend.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SessionStore for StateStoreSessions {
    async fn ensure(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<(SessionId, SessionRecord), CoordinatorError> {
        match session_id {
            None => Ok((SessionId::new(Uuid::new_v4().to_string()), SessionRecord::default())),
            Some(id) => {
                let scope = Scope::Session(id.clone());
                let value = self
                    .store
                    .read(&scope, RECORD_KEY)
                    .await
                    .map_err(|err| CoordinatorError::SessionStoreFailed(err.to_string()))?;
                match value {
                    Some(value) => {
                        let record: SessionRecord = serde_json::from_value(value).map_err(|err| {
                            CoordinatorError::SessionStoreFailed(format!(
                                "corrupt session record for {id}: {err}"
                            ))
                        })?;
                        Ok((id, record))
                    }
                    None => Err(CoordinatorError::SessionNotFound(id)),
                }
            }
        }
    }

    async fn save(
        &self,
        session_id: &SessionId,
        record: &SessionRecord,
    ) -> Result<(), CoordinatorError> {
        let scope = Scope::Session(session_id.clone());
        let value = serde_json::to_value(record)
            .map_err(|err| CoordinatorError::SessionStoreFailed(err.to_string()))?;
        self.store
            .write(&scope, RECORD_KEY, value)
            .await
            .map_err(|err| CoordinatorError::SessionStoreFailed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_state_memory::MemoryStore;

    #[tokio::test]
    async fn ensure_with_no_id_creates_a_fresh_session() {
        let sessions = StateStoreSessions::new(Arc::new(MemoryStore::new()));
        let (id, record) = sessions.ensure(None).await.unwrap();
        assert!(!id.as_str().is_empty());
        assert!(record.messages.is_empty());
    }

    #[tokio::test]
    async fn ensure_with_unknown_id_errors() {
        let sessions = StateStoreSessions::new(Arc::new(MemoryStore::new()));
        let err = sessions
            .ensure(Some(SessionId::new("missing")))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn ensure_with_known_id_loads_the_saved_record() {
        let sessions = StateStoreSessions::new(Arc::new(MemoryStore::new()));
        let id = SessionId::new("s-1");
        let mut record = SessionRecord::default();
        record
            .metadata
            .insert("title".to_string(), serde_json::json!("hello"));
        sessions.save(&id, &record).await.unwrap();

        let (loaded_id, loaded) = sessions.ensure(Some(id.clone())).await.unwrap();
        assert_eq!(loaded_id, id);
        assert_eq!(loaded.metadata.get("title").unwrap(), "hello");
    }
}
