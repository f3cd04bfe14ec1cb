//! Runtime configuration: the defaults a [`crate::ReactEngine`] is
//! built with, the per-run overrides a caller may supply, and the
//! resolved configuration actually used for one run.

use std::time::Duration;

/// Static configuration a `ReactEngine` is constructed with (§4.5, §4.9).
#[derive(Debug, Clone)]
pub struct ReactConfig {
    /// System prompt assembled at `prepare`, before any per-run override.
    pub system_prompt: String,
    /// Model used when a run doesn't override it.
    pub default_model: Option<String>,
    /// Output token cap when a run doesn't override it.
    pub default_max_tokens: u32,
    /// Iteration cap when a run doesn't override it.
    pub default_max_iterations: u32,
    /// Cost cap (USD) when a run doesn't override it. `None` disables
    /// the cost limit.
    pub default_max_cost: Option<rust_decimal::Decimal>,
    /// Wall-clock duration cap when a run doesn't override it. `None`
    /// disables the duration limit.
    pub default_max_duration: Option<Duration>,
    /// Whether memory refresh is enabled by default.
    pub memory_refresh_enabled: bool,
    /// Iteration interval between memory refreshes.
    pub memory_refresh_interval: u32,
    /// Chunk size for streaming the final answer (§4.5 Finish).
    pub finalize_chunk_chars: usize,
    /// Byte threshold above which a tool-result argument is compacted
    /// (§4.5 Observe).
    pub compaction_threshold_bytes: usize,
    /// Distance (in characters since the last assistant reply) that
    /// triggers a goal/plan reminder re-render (§4.5 Observe).
    pub reminder_distance_chars: usize,
    /// Upper bound on tool calls executed concurrently within one
    /// iteration (§4.5 Execute, §5 "bounded by a shared concurrency
    /// limiter").
    pub tool_concurrency_limit: usize,
    /// Token budget a [`fulcrum_context::ContextStrategy`] compacts
    /// against before each `think` call.
    pub context_token_limit: usize,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            default_model: None,
            default_max_tokens: 4096,
            default_max_iterations: 10,
            default_max_cost: None,
            default_max_duration: None,
            memory_refresh_enabled: false,
            memory_refresh_interval: 5,
            finalize_chunk_chars: 800,
            compaction_threshold_bytes: 256,
            reminder_distance_chars: 800,
            tool_concurrency_limit: 4,
            context_token_limit: 100_000,
        }
    }
}

/// Per-run overrides a caller may supply to `ReactEngine::execute`.
/// Every field is optional; absent fields fall back to the engine's
/// [`ReactConfig`] defaults.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    /// Model override for this run.
    pub model: Option<String>,
    /// System prompt override for this run.
    pub system: Option<String>,
    /// Max-tokens override for this run.
    pub max_tokens: Option<u32>,
    /// Max-iterations override for this run.
    pub max_iterations: Option<u32>,
    /// Cost-cap override for this run.
    pub max_cost: Option<rust_decimal::Decimal>,
    /// Duration-cap override for this run.
    pub max_duration: Option<Duration>,
    /// Tool names this run is restricted to. `None` means every
    /// registered tool is allowed.
    pub allowed_tools: Option<Vec<String>>,
    /// Whether this run should attempt memory refresh, overriding the
    /// engine default.
    pub memory_refresh_enabled: Option<bool>,
    /// User ID in scope for this run, needed for memory refresh.
    pub user_id: Option<String>,
}

/// Configuration actually in force for one run, after folding
/// [`RunOverrides`] onto [`ReactConfig`]. Resolved once at `prepare`
/// and held fixed for the run's lifetime.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Model to request, `None` defers to the provider's own default.
    pub model: Option<String>,
    /// System prompt for this run.
    pub system: String,
    /// Output token cap.
    pub max_tokens: u32,
    /// Iteration cap.
    pub max_iterations: u32,
    /// Cost cap, if any.
    pub max_cost: Option<rust_decimal::Decimal>,
    /// Duration cap, if any.
    pub max_duration: Option<Duration>,
    /// Tool names this run may call. `None` means every registered
    /// tool is allowed.
    pub allowed_tools: Option<Vec<String>>,
    /// Whether memory refresh runs for this run.
    pub memory_refresh_enabled: bool,
    /// Iteration interval between memory refreshes.
    pub memory_refresh_interval: u32,
    /// User ID in scope, if memory refresh needs one.
    pub user_id: Option<String>,
}

impl ReactConfig {
    /// Fold `overrides` onto this engine's defaults.
    pub fn resolve(&self, overrides: &RunOverrides) -> ResolvedConfig {
        ResolvedConfig {
            model: overrides.model.clone().or_else(|| self.default_model.clone()),
            system: overrides
                .system
                .clone()
                .unwrap_or_else(|| self.system_prompt.clone()),
            max_tokens: overrides.max_tokens.unwrap_or(self.default_max_tokens),
            max_iterations: overrides
                .max_iterations
                .unwrap_or(self.default_max_iterations),
            max_cost: overrides.max_cost.or(self.default_max_cost),
            max_duration: overrides.max_duration.or(self.default_max_duration),
            allowed_tools: overrides.allowed_tools.clone(),
            memory_refresh_enabled: overrides
                .memory_refresh_enabled
                .unwrap_or(self.memory_refresh_enabled),
            memory_refresh_interval: self.memory_refresh_interval,
            user_id: overrides.user_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_defaults_when_overrides_empty() {
        let config = ReactConfig {
            system_prompt: "be helpful".into(),
            ..Default::default()
        };
        let resolved = config.resolve(&RunOverrides::default());
        assert_eq!(resolved.system, "be helpful");
        assert_eq!(resolved.max_iterations, 10);
        assert_eq!(resolved.max_tokens, 4096);
        assert!(resolved.allowed_tools.is_none());
    }

    #[test]
    fn resolve_prefers_overrides() {
        let config = ReactConfig::default();
        let overrides = RunOverrides {
            max_iterations: Some(3),
            allowed_tools: Some(vec!["plan".into()]),
            ..Default::default()
        };
        let resolved = config.resolve(&overrides);
        assert_eq!(resolved.max_iterations, 3);
        assert_eq!(resolved.allowed_tools, Some(vec!["plan".into()]));
    }
}
