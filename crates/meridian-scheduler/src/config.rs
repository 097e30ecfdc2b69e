//! Scheduler configuration.

use serde_json::{Value, json};

/// Tuning for one scheduler instance. Budgets apply per query.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Wall-clock budget per query, in milliseconds.
    pub time_budget_ms: u64,
    /// Token budget per query.
    pub token_budget: u64,
    /// Backend-request budget per query.
    pub request_budget: u64,
    /// Maximum attempts per node (first try included).
    pub max_attempts: u32,
    /// Result limit passed to backend adapters.
    pub result_limit: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: 120_000,
            token_budget: 50_000,
            request_budget: 25,
            max_attempts: 3,
            result_limit: 10,
        }
    }
}

impl SchedulerConfig {
    /// Params object handed to adapters and to the cost heuristic.
    pub fn operation_params(&self) -> Value {
        json!({ "limit": self.result_limit })
    }
}
