//! Per-query resource budgets for the Meridian orchestrator.
//!
//! Every query session owns one [`BudgetTracker`] with immutable ceilings on
//! time, tokens, and requests. The [`BudgetManager`] estimates operation
//! costs, gates calls before they happen, and commits consumption atomically
//! so parallel branches cannot double-spend the last unit of budget.
//!
//! Budget insufficiency is never an error: [`BudgetManager::enforce_budget`]
//! signals it through its boolean result, and the session continues with
//! whatever results already exist.

mod manager;
mod tracker;

pub use manager::{BudgetManager, DEFAULT_WARNING_THRESHOLD};
pub use tracker::{BudgetStatus, BudgetSummary, BudgetTracker, ResourceSet, ResourceType};
