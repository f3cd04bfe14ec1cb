//! Collaborator ports the scheduler drives: persistence, the
//! coordinator it fires into, outcome notification, and the external
//! goal store OKR-derived jobs are reconciled from (§4.7).

use async_trait::async_trait;
use fulcrum_core::Job;
use fulcrum_proto::{CancellationToken, JobId, SessionId};

use crate::error::SchedulerError;

/// Persistence for the job table (§4.7 "jobs are loaded from a job
/// store at start and saved on every status transition").
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Load every persisted job.
    async fn load_all(&self) -> Result<Vec<Job>, SchedulerError>;

    /// Persist `job`, creating or overwriting its record.
    async fn save(&self, job: &Job) -> Result<(), SchedulerError>;

    /// Remove a job's record.
    async fn delete(&self, id: &JobId) -> Result<(), SchedulerError>;
}

/// The outcome of one fire, handed to a [`Notifier`].
#[derive(Debug, Clone)]
pub enum FireOutcome {
    /// The coordinator invocation returned a result.
    Success {
        /// A short summary of the result, for the notification body.
        summary: String,
    },
    /// The coordinator invocation returned an error.
    Failure {
        /// The error text.
        error: String,
    },
}

/// Delivers fire outcomes to an external channel ("chat or mail", §4.7).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Record the outcome of firing `job_name`.
    async fn notify(&self, job_name: &str, outcome: &FireOutcome);
}

/// A notifier that discards every outcome, for configurations with no
/// notification channel wired up.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _job_name: &str, _outcome: &FireOutcome) {}
}

/// Invokes the coordinator's `ExecuteTask` on behalf of a fired job
/// (§4.7). Scoped to a `Result<String, String>` rather than a full
/// `TaskResult`, since the scheduler only needs a short summary for
/// notification and a pass/fail signal for recovery bookkeeping.
#[async_trait]
pub trait CoordinatorInvoker: Send + Sync {
    /// Run the coordinator against `trigger`'s opaque payload under
    /// `session_id`, cooperating with `cancel`.
    async fn execute_task(
        &self,
        session_id: SessionId,
        trigger: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<String, String>;
}

/// Source of OKR-derived job definitions, reconciled into the
/// scheduler's table on a periodic sync (§4.7).
#[async_trait]
pub trait JobSource: Send + Sync {
    /// The current desired set of OKR-derived jobs.
    async fn list_jobs(&self) -> Result<Vec<Job>, SchedulerError>;
}
