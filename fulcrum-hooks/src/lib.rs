#![deny(missing_docs)]
//! Hook registry and pipeline dispatch.
//!
//! [`HookRegistry`] collects [`Hook`](fulcrum_proto::Hook) implementations
//! into an ordered pipeline. At each hook point, hooks fire in
//! registration order; the pipeline short-circuits on any action other
//! than `Continue`. Hook errors are logged and treated as `Continue` so a
//! misbehaving observer cannot take down a run.

use std::sync::Arc;

use fulcrum_proto::{Hook, HookAction, HookContext};

/// A registry that dispatches hook events to an ordered pipeline of hooks.
pub struct HookRegistry {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookRegistry {
    /// Create a new empty hook registry.
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Add a hook to the end of the pipeline.
    pub fn add(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Dispatch a hook event through the pipeline.
    ///
    /// Returns the final action. If every hook at this point returns
    /// `Continue`, the result is `Continue`. Any other action short-
    /// circuits the remaining hooks. Errors are logged via `tracing` and
    /// treated as `Continue`.
    pub async fn dispatch(&self, ctx: &HookContext) -> HookAction {
        for hook in &self.hooks {
            if !hook.points().contains(&ctx.point) {
                continue;
            }

            match hook.on_event(ctx).await {
                Ok(HookAction::Continue) => continue,
                Ok(action) => return action,
                Err(err) => {
                    tracing::warn!(point = ?ctx.point, error = %err, "hook failed; continuing");
                    continue;
                }
            }
        }

        HookAction::Continue
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
