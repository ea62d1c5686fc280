//! Thread-safe token tracker — accumulates per-role counters and serves
//! usage reports.

use crate::model::{ModelRole, RoleUsage, TokenCounters, UsageReport};
use crate::pricing::ModelPricing;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Accumulates input/output token counts per logical model role.
///
/// Shared between the orchestrator and the collaborators that make their
/// own model calls (edit generator, execution analyzer). Counters only grow
/// until an explicit [`TokenTracker::reset`].
pub struct TokenTracker {
    counters: RwLock<BTreeMap<ModelRole, TokenCounters>>,
    pricing: ModelPricing,
    max_context_tokens: u64,
}

impl TokenTracker {
    /// Create a tracker with the given context window size and pricing.
    pub fn new(max_context_tokens: u64, pricing: ModelPricing) -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            pricing,
            max_context_tokens: max_context_tokens.max(1),
        }
    }

    /// Add one call's usage to a role.
    pub fn record(&self, role: ModelRole, input: u64, output: u64) {
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        counters.entry(role).or_default().add(input, output);
        debug!(role = %role, input, output, "Recorded token usage");
    }

    /// Current counters for a role.
    pub fn get(&self, role: ModelRole) -> TokenCounters {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&role)
            .copied()
            .unwrap_or_default()
    }

    /// Sum over all roles.
    pub fn total(&self) -> TokenCounters {
        let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        counters.values().fold(TokenCounters::default(), |mut acc, c| {
            acc.add(c.input, c.output);
            acc
        })
    }

    /// Zero every counter (the `reset` command).
    pub fn reset(&self) {
        self.counters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Build a report row per role, with context share and cost.
    pub fn report(&self) -> UsageReport {
        let mut rows = Vec::with_capacity(ModelRole::ALL.len());
        let mut total = TokenCounters::default();
        let mut context_tokens = 0u64;

        for role in ModelRole::ALL {
            let counters = self.get(role);
            total.add(counters.input, counters.output);
            let context_percent = role.keeps_context().then(|| {
                context_tokens += counters.total();
                self.percent_of_context(counters.total())
            });
            rows.push(RoleUsage {
                role,
                counters,
                context_percent,
                cost_usd: self.pricing.cost(counters.input, counters.output),
            });
        }

        UsageReport {
            total_cost_usd: rows.iter().map(|r| r.cost_usd).sum(),
            rows,
            total,
            context_percent: self.percent_of_context(context_tokens),
        }
    }

    fn percent_of_context(&self, tokens: u64) -> f64 {
        tokens as f64 / self.max_context_tokens as f64 * 100.0
    }
}

impl Default for TokenTracker {
    fn default() -> Self {
        Self::new(1_000_000, ModelPricing::default())
    }
}
