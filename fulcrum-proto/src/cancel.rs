//! Cooperative cancellation.
//!
//! §5 calls for "a per-call cancellation token passed through every
//! port". `tokio_util`'s token already gives us clone-and-share
//! semantics with a `cancelled()` future any I/O boundary can select
//! against, so every port in this workspace threads this type rather
//! than inventing its own.

pub use tokio_util::sync::CancellationToken;
