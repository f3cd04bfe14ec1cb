//! `BackgroundTask` data shape (§3). Behavior — dispatch, status,
//! collection, dependency gating, completion signaling — lives in
//! `fulcrum-background`; this module only defines the record.

use crate::result::TaskResult;
use fulcrum_proto::{BackgroundTaskId, CausationId};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`BackgroundTask`] (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundTaskStatus {
    /// Declared with unmet dependencies; not yet eligible to run.
    Blocked,
    /// Eligible to run; not yet started.
    Pending,
    /// Executing.
    Running,
    /// Finished without error.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before reaching a terminal outcome on its own.
    Cancelled,
}

impl BackgroundTaskStatus {
    /// Whether this status is terminal — no further transition occurs.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BackgroundTaskStatus::Completed
                | BackgroundTaskStatus::Failed
                | BackgroundTaskStatus::Cancelled
        )
    }
}

/// A detached sub-run dispatched by a tool on behalf of a parent run
/// (§3, §4.4). Owned by the `BackgroundTaskManager` that dispatched it;
/// lives only for the parent run's lifetime unless explicitly detached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundTask {
    /// Caller-chosen identifier, unique within the parent run.
    pub id: BackgroundTaskId,
    /// Human-readable description.
    pub description: String,
    /// The prompt the sub-run is dispatched with.
    pub prompt: String,
    /// `"internal"` (or empty) for the coordinator closure, otherwise
    /// an external-agent executor key.
    pub agent_type: String,
    /// The event that caused this task to be dispatched.
    pub causation_id: CausationId,
    /// Current lifecycle state.
    pub status: BackgroundTaskStatus,
    /// Wall-clock start time.
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Wall-clock end time, set once terminal.
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    /// IDs of tasks that must complete before this one may start.
    pub depends_on: Vec<BackgroundTaskId>,
    /// Whether a collaboration-context section built from `depends_on`
    /// answers is prepended to the prompt.
    pub inherit_context: bool,
    /// The sub-run's result, once completed.
    pub result: Option<TaskResult>,
    /// The error, if it failed.
    pub error: Option<String>,
}

impl BackgroundTask {
    /// Whether every entry in `depends_on` is already `Completed` in
    /// `all`. A task with no dependencies is trivially ready. A
    /// dependency that failed (or was cancelled) keeps this task
    /// blocked forever, per §4.4 ("Failed dependencies keep the task
    /// blocked").
    pub fn dependencies_satisfied<'a>(
        &self,
        lookup: impl Fn(&BackgroundTaskId) -> Option<&'a BackgroundTaskStatus>,
    ) -> bool {
        self.depends_on
            .iter()
            .all(|dep| matches!(lookup(dep), Some(BackgroundTaskStatus::Completed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(BackgroundTaskStatus::Completed.is_terminal());
        assert!(BackgroundTaskStatus::Failed.is_terminal());
        assert!(BackgroundTaskStatus::Cancelled.is_terminal());
        assert!(!BackgroundTaskStatus::Pending.is_terminal());
        assert!(!BackgroundTaskStatus::Blocked.is_terminal());
    }

    #[test]
    fn dependencies_satisfied_requires_all_completed() {
        let task = BackgroundTask {
            id: BackgroundTaskId::new("bg-2"),
            description: "d".into(),
            prompt: "p".into(),
            agent_type: "internal".into(),
            causation_id: CausationId::new("r-1"),
            status: BackgroundTaskStatus::Blocked,
            started_at: None,
            ended_at: None,
            depends_on: vec![BackgroundTaskId::new("bg-1")],
            inherit_context: true,
            result: None,
            error: None,
        };
        let completed = BackgroundTaskStatus::Completed;
        let failed = BackgroundTaskStatus::Failed;
        assert!(task.dependencies_satisfied(|_| Some(&completed)));
        assert!(!task.dependencies_satisfied(|_| Some(&failed)));
        assert!(!task.dependencies_satisfied(|_| None));
    }
}
