//! `AgentCoordinator` (C6): session lifecycle, event-listener wiring,
//! and stage sequencing for one `ExecuteTask` call.
//!
//! No teacher crate has a direct equivalent — the closest analogue is
//! `neuron-orch-local::LocalOrch`'s dispatch-by-key loop and
//! `layer0::Orchestrator`'s transport-agnostic dispatch/signal/query
//! split, both read for the shape of owning a collaborator table and
//! routing into it rather than for the stage sequence itself, which
//! this crate designs fresh against the ten-step flow it implements.

#![deny(missing_docs)]

mod coordinator;
mod error;
mod ports;
mod session_store;
mod title;

pub use coordinator::{AgentCoordinator, ExecuteTaskRequest};
pub use error::CoordinatorError;
pub use ports::{
    AttachmentMigrator, ExecutionEnvironment, NoopAttachmentMigrator, PrepareContext,
    PreparationService, SessionRecord, SessionStore, SessionTitleUpdater,
};
pub use session_store::StateStoreSessions;
pub use title::PlanSessionTitleRecorder;
