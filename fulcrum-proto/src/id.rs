//! Typed ID wrappers for session, run, workflow, job, and background-task identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed ID wrappers prevent mixing up session IDs, run IDs, and the rest.
/// These are plain strings underneath — no UUID enforcement, no format
/// requirement. Callers that want UUIDs can generate one and wrap it.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to String.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(SessionId, "Unique identifier for a conversation session.");
typed_id!(RunId, "Unique identifier for one invocation of ExecuteTask.");
typed_id!(
    WorkflowId,
    "Unique identifier for the workflow graph of one run."
);
typed_id!(JobId, "Unique identifier for a scheduled job.");
typed_id!(
    BackgroundTaskId,
    "Caller-chosen identifier for a detached background task, unique within its parent run."
);
typed_id!(
    CorrelationId,
    "Root run ID of a causal chain; inherited unchanged by every descendant event and run."
);
typed_id!(
    CausationId,
    "Event ID (or run ID, for a fresh root) that caused the current event or run; the immediate parent in the causal DAG."
);
typed_id!(EventId, "Unique identifier for one emitted event.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_id_roundtrips_through_string() {
        let id = RunId::new("run-1");
        assert_eq!(id.as_str(), "run-1");
        assert_eq!(id.to_string(), "run-1");
        let from_owned: RunId = String::from("run-2").into();
        assert_eq!(from_owned.as_str(), "run-2");
    }

    #[test]
    fn typed_ids_are_distinct_types() {
        let session = SessionId::new("s-1");
        let run = RunId::new("s-1");
        assert_eq!(session.as_str(), run.as_str());
    }
}
