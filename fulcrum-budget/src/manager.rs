//! `BudgetManager` (C8): per-session token/cost accounting and
//! model-tier downgrade suggestion (§4.8).

use std::collections::HashMap;
use std::sync::Mutex;

use fulcrum_proto::SessionId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::tiers::ModelTierTable;

/// Default ratio of a dimension's usage to its limit that triggers
/// `BudgetState::Warning` (§4.8).
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.8;

/// Result of `CheckBudget` (§3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetState {
    /// Every dimension is below its warning threshold.
    Ok,
    /// At least one dimension crossed its warning threshold but none
    /// exceeded its hard limit.
    Warning,
    /// At least one dimension exceeded its hard limit.
    Exceeded,
}

/// Per-session hard limits and the warning threshold they're checked
/// against. Any limit left `None` is treated as unbounded for that
/// dimension.
#[derive(Debug, Clone)]
pub struct BudgetLimits {
    /// Input-token cap.
    pub max_input_tokens: Option<u64>,
    /// Output-token cap.
    pub max_output_tokens: Option<u64>,
    /// Combined input+output token cap.
    pub max_total_tokens: Option<u64>,
    /// Cost cap in USD.
    pub max_cost: Option<Decimal>,
    /// Usage-to-limit ratio that triggers `Warning` (§4.8, default 0.8).
    pub warning_threshold: f64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_input_tokens: None,
            max_output_tokens: None,
            max_total_tokens: None,
            max_cost: None,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }
}

/// Running usage for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionUsage {
    /// Cumulative input tokens.
    pub input_tokens: u64,
    /// Cumulative output tokens.
    pub output_tokens: u64,
    /// Cumulative cost in USD, derived from the model-tier table.
    pub cost: Decimal,
    /// Most recently used model, if any usage has been recorded.
    pub last_model: Option<String>,
}

impl SessionUsage {
    fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    fn ratio(value: u64, limit: Option<u64>) -> f64 {
        match limit {
            Some(0) => 1.0,
            Some(limit) => value as f64 / limit as f64,
            None => 0.0,
        }
    }

    fn cost_ratio(&self, limit: Option<Decimal>) -> f64 {
        match limit {
            Some(limit) if limit > Decimal::ZERO => {
                (self.cost / limit).to_string().parse::<f64>().unwrap_or(0.0)
            }
            Some(_) => 1.0,
            None => 0.0,
        }
    }

    fn max_ratio(&self, limits: &BudgetLimits) -> f64 {
        [
            Self::ratio(self.input_tokens, limits.max_input_tokens),
            Self::ratio(self.output_tokens, limits.max_output_tokens),
            Self::ratio(self.total_tokens(), limits.max_total_tokens),
            self.cost_ratio(limits.max_cost),
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }
}

/// Per-session token/cost accounting and model-tier downgrade
/// suggestion (§4.8). Every operation is safe under concurrent
/// readers/writers through a single mutex (§5: "independent per-
/// component locks with no cross-component lock acquisition").
pub struct BudgetManager {
    limits: BudgetLimits,
    tiers: ModelTierTable,
    sessions: Mutex<HashMap<SessionId, SessionUsage>>,
}

impl BudgetManager {
    /// Build a manager with the given limits and model-tier table.
    pub fn new(limits: BudgetLimits, tiers: ModelTierTable) -> Self {
        Self {
            limits,
            tiers,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Record a token delta for `session`, deriving cost from the
    /// model-tier table if `model` is known. An unknown model
    /// contributes tokens but no cost (§4.8 silently tolerates models
    /// outside the cost table rather than failing usage recording).
    pub fn record_usage(
        &self,
        session: &SessionId,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) {
        let mut sessions = self.sessions.lock().expect("budget manager mutex poisoned");
        let usage = sessions.entry(session.clone()).or_default();
        usage.input_tokens += input_tokens;
        usage.output_tokens += output_tokens;
        usage.last_model = Some(model.to_string());
        if let Some(tier) = self.tiers.get(model) {
            usage.cost += tier.estimate_cost(input_tokens, output_tokens);
        }
    }

    /// Current usage snapshot for `session`, or the zero value if no
    /// usage has been recorded yet.
    pub fn usage(&self, session: &SessionId) -> SessionUsage {
        self.sessions
            .lock()
            .expect("budget manager mutex poisoned")
            .get(session)
            .cloned()
            .unwrap_or_default()
    }

    /// Budget state for `session`, based on the maximum usage ratio
    /// across every configured dimension (§4.8).
    pub fn check_budget(&self, session: &SessionId) -> BudgetState {
        let usage = self.usage(session);
        let ratio = usage.max_ratio(&self.limits);
        if ratio >= 1.0 {
            BudgetState::Exceeded
        } else if ratio >= self.limits.warning_threshold {
            BudgetState::Warning
        } else {
            BudgetState::Ok
        }
    }

    /// The next-cheaper model tier for `session`'s last-used model,
    /// when `check_budget` would return `Warning` or `Exceeded`. Returns
    /// `None` when the session is under budget, already on the cheapest
    /// tier, or its last model isn't in the cost table (§4.8).
    pub fn suggest_downgrade(&self, session: &SessionId) -> Option<String> {
        let state = self.check_budget(session);
        if state == BudgetState::Ok {
            return None;
        }
        let usage = self.usage(session);
        let last_model = usage.last_model?;
        self.tiers
            .next_cheaper_than(&last_model)
            .map(|tier| tier.model.clone())
    }

    /// Clear all recorded usage for `session`.
    pub fn reset_session(&self, session: &SessionId) {
        self.sessions
            .lock()
            .expect("budget manager mutex poisoned")
            .remove(session);
    }
}
