//! `Job` data shape (§3, §6). Behavior — cron evaluation, cooldown,
//! concurrency caps, recovery backoff, persistence — lives in
//! `fulcrum-scheduler`; this module only defines the record and its
//! wire/storage shape.

use fulcrum_proto::JobId;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`Job`] (§3).
///
/// Invariant (§3, §8): a job only leaves `Paused` through an explicit
/// resume — the scheduler never auto-resumes a paused job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Registered but not yet evaluated against the clock.
    Pending,
    /// Eligible to fire on its cron schedule.
    Active,
    /// Suspended after exhausting recovery retries; requires explicit resume.
    Paused,
    /// Will not fire again (one-shot jobs, or explicitly retired).
    Completed,
}

/// A cron-scheduled trigger bound to a coordinator invocation (§3, §4.7,
/// §6). Persisted as a JSON document per the format named in §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier.
    pub id: JobId,
    /// Human-readable display name.
    pub name: String,
    /// Standard 5-field cron expression (minute hour day-of-month month
    /// day-of-week).
    pub cron_expr: String,
    /// Opaque trigger payload passed through to the coordinator.
    pub trigger: serde_json::Value,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Timestamp of the most recent fire, if any.
    pub last_run: Option<chrono::DateTime<chrono::Utc>>,
    /// Timestamp of the next scheduled fire, if computable.
    pub next_run: Option<chrono::DateTime<chrono::Utc>>,
    /// Count of consecutive failures since the last success.
    pub failure_count: u32,
    /// Timestamp of the most recent failure, if any.
    pub last_failure: Option<chrono::DateTime<chrono::Utc>>,
    /// Error text from the most recent failure, if any.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last-updated timestamp, bumped on every status transition.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Job {
    /// Create a freshly registered, active job with no fire history.
    pub fn new(
        id: JobId,
        name: impl Into<String>,
        cron_expr: impl Into<String>,
        trigger: serde_json::Value,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            cron_expr: cron_expr.into(),
            trigger,
            status: JobStatus::Active,
            last_run: None,
            next_run: None,
            failure_count: 0,
            last_failure: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_active_with_no_history() {
        let job = Job::new(
            JobId::new("job-1"),
            "nightly-digest",
            "0 0 * * *",
            serde_json::json!({}),
            chrono::Utc::now(),
        );
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.failure_count, 0);
        assert!(job.last_run.is_none());
    }

    #[test]
    fn status_is_snake_case_on_wire() {
        let json = serde_json::to_string(&JobStatus::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
    }
}
