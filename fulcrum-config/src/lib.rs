//! Cached, subscribable override store for runtime settings (C9 in
//! the crate-to-component table).
//!
//! No teacher crate implements a config center; grounded in the
//! atomic `.tmp` + rename write pattern used elsewhere in the pack
//! for durable single-file state, and in `tokio::sync::broadcast` for
//! non-blocking subscriber fan-out, consistent with the preference
//! for `tokio` sync primitives over hand-rolled channels seen in
//! `neuron-state-memory`'s `tokio::sync::RwLock` use.

#![deny(missing_docs)]

mod center;
mod error;
mod merge;
mod store;

pub use center::{closed_channel, subscribe_optional, ConfigCenter, DEFAULT_TTL};
pub use error::ConfigError;
pub use merge::merge_overrides;
pub use store::{ConfigStore, FileConfigStore};
