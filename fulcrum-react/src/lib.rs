#![deny(missing_docs)]
//! ReactEngine (C5): the Think -> Plan gate -> Plan review -> Execute
//! -> Observe -> Memory refresh -> Finish loop that drives one agent
//! run (§3, §4.5).
//!
//! This crate owns the iteration runtime only. Its collaborators —
//! the workflow graph (`fulcrum-workflow`), the event wire format
//! (`fulcrum-events`), the LLM provider port (`fulcrum-provider`), the
//! tool registry (`fulcrum-tool`), the hook pipeline (`fulcrum-hooks`),
//! context compaction (`fulcrum-context`), and background-task
//! dispatch (`fulcrum-background`) — are all injected, never
//! constructed here.

mod attachments;
mod compaction;
mod config;
mod engine;
mod error;
mod gates;
mod memory;

pub use attachments::{expand_tool_input, resolve_placeholder};
pub use compaction::compact_arguments;
pub use config::{ReactConfig, ResolvedConfig, RunOverrides};
pub use engine::ReactEngine;
pub use error::ReactError;
pub use gates::{check_gates, needs_plan_review};
pub use memory::{extract_keywords, should_refresh, MemoryService};
