//! Cron-expression-driven trigger evaluation, cooldown, concurrency
//! caps, recovery with backoff, and persistence (C7 in the
//! crate-to-component table).
//!
//! No teacher crate implements a job scheduler; this crate is shaped
//! like `fulcrum-background`'s dispatch loop — a `HashMap` of job
//! state behind a single mutex, `tokio::spawn` per fire — the same
//! granularity `neuron-orch-local::LocalOrch` uses for task state.

#![deny(missing_docs)]

mod cron_expr;
mod error;
mod ports;
mod scheduler;

pub use cron_expr::{next_after, parse};
pub use error::SchedulerError;
pub use ports::{CoordinatorInvoker, FireOutcome, JobSource, JobStore, NullNotifier, Notifier};
pub use scheduler::{ConcurrencyPolicy, JobScheduler, SchedulerConfig};
