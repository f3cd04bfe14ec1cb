//! Execution routing ports (§4.4 "Execution routing"): the internal
//! coordinator closure and the external-agent executor table, mirrored
//! from `neuron-orch-local::LocalOrch`'s `HashMap<String, Arc<dyn
//! Operator>>` dispatch-by-key, generalized into a two-arm split
//! instead of a single flat registry, since the internal arm needs to
//! recurse back into the coordinator rather than call a leaf operator.

use async_trait::async_trait;
use fulcrum_core::{AgentLevel, TaskResult};
use fulcrum_proto::{CausationId, CorrelationId, RunId, SessionId};

/// Fixed identity fields inherited from the parent run that dispatched
/// a background task (§4.4: "inherits correlation, causation, session,
/// and a fresh run ID").
#[derive(Debug, Clone)]
pub struct ParentRunContext {
    /// Session the parent run belongs to.
    pub session_id: SessionId,
    /// The parent run's own ID.
    pub run_id: RunId,
    /// Root of the parent run's causal chain, inherited unchanged.
    pub correlation_id: CorrelationId,
    /// The parent run's own causation ID. Per §4.4, this value becomes
    /// the dispatched child's `parent_run_id`.
    pub causation_id: CausationId,
}

/// What an internal (same-engine) background run is invoked with.
#[derive(Debug, Clone)]
pub struct InternalRunRequest {
    /// Session the child run belongs to (inherited from the parent).
    pub session_id: SessionId,
    /// Freshly minted run ID for the child.
    pub run_id: RunId,
    /// The parent run's causation ID, reinterpreted as this child's
    /// parent-run-ID per §4.4.
    pub parent_run_id: RunId,
    /// Root of the causal chain, inherited unchanged from the parent.
    pub correlation_id: CorrelationId,
    /// Immediate causal parent of this child run: the parent run itself.
    pub causation_id: CausationId,
    /// Prompt to dispatch, with any collaboration-context section
    /// already prepended.
    pub prompt: String,
    /// Always `Subagent` for a background-dispatched run (§3).
    pub agent_level: AgentLevel,
}

/// Invokes the coordinator recursively for `"internal"` (or empty)
/// agent-type tags, on the same engine and session.
///
/// Implemented by `fulcrum-coordinator` and injected into the manager
/// at construction — this crate never depends on the coordinator
/// directly, only on this seam.
#[async_trait]
pub trait InternalAgentRunner: Send + Sync {
    /// Run one background task to completion (or until cancelled).
    async fn run(
        &self,
        request: InternalRunRequest,
        cancel: fulcrum_proto::CancellationToken,
    ) -> Result<TaskResult, String>;
}

/// Invokes an out-of-process or third-party agent for any agent-type
/// tag other than `"internal"`/empty (§4.4, §1 "Out of scope").
#[async_trait]
pub trait ExternalAgentExecutor: Send + Sync {
    /// Run one background task through this executor.
    async fn execute(
        &self,
        agent_type: &str,
        prompt: String,
        cancel: fulcrum_proto::CancellationToken,
    ) -> Result<TaskResult, String>;
}
