//! The budget manager: cost estimation, affordability gates, enforcement,
//! and status reporting.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::tracker::{BudgetStatus, BudgetSummary, BudgetTracker, ResourceSet, ResourceType};

/// Fraction of any ceiling at which the status turns to `Warning`.
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.8;

/// Result limit assumed when an operation's params carry none.
const DEFAULT_RESULT_LIMIT: u64 = 10;

/// Estimates, enforces, and reports consumption of per-query budgets.
///
/// Constructed once per process and injected into the scheduler; holds no
/// per-query state itself. The per-query state lives in [`BudgetTracker`].
#[derive(Debug, Clone)]
pub struct BudgetManager {
    warning_threshold: f64,
}

impl Default for BudgetManager {
    fn default() -> Self {
        Self {
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }
}

impl BudgetManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the warning threshold (fraction of budget, 0.0–1.0).
    pub fn with_warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = threshold;
        self
    }

    /// Create a tracker with the given ceilings; all usage starts at zero.
    pub fn create_tracker(
        &self,
        time_budget_ms: u64,
        token_budget: u64,
        request_budget: u64,
    ) -> BudgetTracker {
        debug!(
            time_budget_ms,
            token_budget, request_budget, "created budget tracker"
        );
        BudgetTracker::new(ResourceSet::new(time_budget_ms, token_budget, request_budget))
    }

    /// Static, deterministic cost heuristic per backend-call type.
    ///
    /// Costs scale with the requested result `limit` (from `params`); the
    /// tracker is never consulted or touched here.
    pub fn estimate_operation_cost(&self, operation: &str, params: &Value) -> ResourceSet {
        let limit = params
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_RESULT_LIMIT);

        let (base_time_ms, tokens_per_result) = match operation {
            "literature-search" => (2_000, 60),
            "trials-search" => (3_000, 80),
            "semantic-search" => (1_500, 40),
            // Unknown operations get a conservative default.
            _ => (2_000, 50),
        };

        ResourceSet::new(base_time_ms + 100 * limit, tokens_per_result * limit, 1)
    }

    /// Whether the tracker can absorb the operation's estimated cost on
    /// every resource. Pure/read-only.
    pub fn can_afford_operation(
        &self,
        tracker: &BudgetTracker,
        operation: &str,
        params: &Value,
    ) -> bool {
        tracker.can_afford(self.estimate_operation_cost(operation, params))
    }

    /// Atomically commit `amount` against one resource.
    ///
    /// Never errors: `false` means "do not perform this unit of work", and
    /// the session continues with whatever results already exist.
    pub fn enforce_budget(
        &self,
        tracker: &BudgetTracker,
        resource: ResourceType,
        amount: u64,
    ) -> bool {
        let committed = tracker.try_consume(resource, amount);
        if !committed {
            warn!(
                ?resource,
                amount,
                used = tracker.usage().get(resource),
                ceiling = tracker.budget().get(resource),
                "budget enforcement refused increment"
            );
        }
        committed
    }

    /// Evaluate the tracker against its ceilings.
    ///
    /// Resources are checked in the fixed order TIME, TOKENS, REQUESTS; the
    /// first with `usage >= budget` wins. Otherwise `Warning` if any resource
    /// crossed the warning threshold, else `Active`.
    pub fn check_budget_status(&self, tracker: &BudgetTracker) -> (BudgetStatus, String) {
        let usage = tracker.usage();
        let budget = tracker.budget();

        for resource in ResourceType::PRIORITY {
            if usage.get(resource) >= budget.get(resource) {
                return (
                    BudgetStatus::exceeded(resource),
                    format!(
                        "{resource:?} budget exceeded: {} of {}",
                        usage.get(resource),
                        budget.get(resource)
                    ),
                );
            }
        }

        for resource in ResourceType::PRIORITY {
            let threshold = (budget.get(resource) as f64 * self.warning_threshold) as u64;
            if budget.get(resource) > 0 && usage.get(resource) >= threshold {
                return (
                    BudgetStatus::Warning,
                    format!(
                        "{resource:?} usage at {} of {} budget",
                        usage.get(resource),
                        budget.get(resource)
                    ),
                );
            }
        }

        (BudgetStatus::Active, "within budget".to_string())
    }

    /// Remaining time budget, used to bound any single blocking backend call
    /// so one slow call cannot exhaust the whole session.
    pub fn calculate_timeout(&self, tracker: &BudgetTracker) -> Duration {
        Duration::from_millis(tracker.remaining().time_ms)
    }

    /// Read-only snapshot for observability and finalization.
    pub fn budget_summary(&self, tracker: &BudgetTracker) -> BudgetSummary {
        let (status, message) = self.check_budget_status(tracker);
        BudgetSummary {
            status,
            message,
            budget: tracker.budget(),
            usage: tracker.usage(),
            remaining: tracker.remaining(),
        }
    }
}
