//! Model-tier cost table (§4.8).
//!
//! Mirrors the cost fields on `layer0::operator::OperatorMetadata`: a
//! flat per-1K-input-token rate per model, with output approximated as
//! 2x input (§4.8) since providers price output higher than input and
//! the engine doesn't have a live per-provider output rate to consult.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One entry in a [`crate::BudgetManager`]'s cost table.
///
/// `priority` orders tiers from cheapest to most expensive;
/// `suggest_downgrade` walks strictly downward by priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTier {
    /// Model identifier, as it appears on `TaskResult`/session metadata.
    pub model: String,
    /// Cost in USD per 1,000 input tokens.
    pub cost_per_1k_input: Decimal,
    /// Lower is cheaper. Ties are broken by table order.
    pub priority: u32,
}

impl ModelTier {
    /// Construct a tier entry.
    pub fn new(model: impl Into<String>, cost_per_1k_input: Decimal, priority: u32) -> Self {
        Self {
            model: model.into(),
            cost_per_1k_input,
            priority,
        }
    }

    /// Estimate the cost of `input_tokens`/`output_tokens` at this
    /// tier's rate, approximating output as 2x the input rate (§4.8).
    pub fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> Decimal {
        let input_cost = self.cost_per_1k_input * Decimal::from(input_tokens) / Decimal::from(1000);
        let output_cost =
            self.cost_per_1k_input * Decimal::from(2) * Decimal::from(output_tokens) / Decimal::from(1000);
        input_cost + output_cost
    }
}

/// An ordered table of model tiers, cheapest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelTierTable {
    tiers: Vec<ModelTier>,
}

impl ModelTierTable {
    /// Build a table from an unordered list of tiers, sorting by priority.
    pub fn new(mut tiers: Vec<ModelTier>) -> Self {
        tiers.sort_by_key(|t| t.priority);
        Self { tiers }
    }

    /// Look up a tier by model name.
    pub fn get(&self, model: &str) -> Option<&ModelTier> {
        self.tiers.iter().find(|t| t.model == model)
    }

    /// The next strictly-cheaper tier than `model`, if one exists in the
    /// table and `model` isn't already the cheapest (§4.8 "strict
    /// less-than on priority, maximum less-than").
    pub fn next_cheaper_than(&self, model: &str) -> Option<&ModelTier> {
        let current = self.get(model)?;
        self.tiers
            .iter()
            .filter(|t| t.priority < current.priority)
            .max_by_key(|t| t.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ModelTierTable {
        ModelTierTable::new(vec![
            ModelTier::new("opus", Decimal::new(150, 2), 30),
            ModelTier::new("sonnet", Decimal::new(30, 2), 20),
            ModelTier::new("haiku", Decimal::new(8, 2), 10),
        ])
    }

    #[test]
    fn next_cheaper_picks_the_nearest_lower_priority() {
        let table = table();
        let next = table.next_cheaper_than("opus").unwrap();
        assert_eq!(next.model, "sonnet");
    }

    #[test]
    fn cheapest_tier_has_no_downgrade() {
        let table = table();
        assert!(table.next_cheaper_than("haiku").is_none());
    }

    #[test]
    fn unknown_model_has_no_downgrade() {
        let table = table();
        assert!(table.next_cheaper_than("does-not-exist").is_none());
    }

    #[test]
    fn estimate_cost_weights_output_at_twice_input_rate() {
        let tier = ModelTier::new("m", Decimal::new(100, 2), 1);
        let cost = tier.estimate_cost(1000, 1000);
        assert_eq!(cost, Decimal::new(300, 2));
    }
}
