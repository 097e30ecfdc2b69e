//! The per-query budget tracker.
//!
//! Ceilings are set once at creation; usage counters only ever grow, and all
//! reads/writes go through one mutex so check-and-commit is atomic.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// The three budgeted resources, in status-check priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    /// Wall-clock time, in milliseconds.
    Time,
    /// LLM/embedding tokens.
    Tokens,
    /// Backend requests.
    Requests,
}

impl ResourceType {
    /// Fixed evaluation order for status checks: time beats tokens beats
    /// requests when several resources are exceeded at once.
    pub const PRIORITY: [ResourceType; 3] =
        [ResourceType::Time, ResourceType::Tokens, ResourceType::Requests];
}

/// One amount per resource type. Used for ceilings, usage, and cost
/// estimates alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSet {
    pub time_ms: u64,
    pub tokens: u64,
    pub requests: u64,
}

impl ResourceSet {
    pub fn new(time_ms: u64, tokens: u64, requests: u64) -> Self {
        Self {
            time_ms,
            tokens,
            requests,
        }
    }

    pub fn get(&self, resource: ResourceType) -> u64 {
        match resource {
            ResourceType::Time => self.time_ms,
            ResourceType::Tokens => self.tokens,
            ResourceType::Requests => self.requests,
        }
    }

    fn get_mut(&mut self, resource: ResourceType) -> &mut u64 {
        match resource {
            ResourceType::Time => &mut self.time_ms,
            ResourceType::Tokens => &mut self.tokens,
            ResourceType::Requests => &mut self.requests,
        }
    }
}

/// Where a tracker stands against its ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetStatus {
    Active,
    Warning,
    TimeExceeded,
    TokenExceeded,
    RequestExceeded,
}

impl BudgetStatus {
    /// The exceeded status for a given resource.
    pub fn exceeded(resource: ResourceType) -> Self {
        match resource {
            ResourceType::Time => BudgetStatus::TimeExceeded,
            ResourceType::Tokens => BudgetStatus::TokenExceeded,
            ResourceType::Requests => BudgetStatus::RequestExceeded,
        }
    }

    pub fn is_exceeded(&self) -> bool {
        matches!(
            self,
            BudgetStatus::TimeExceeded | BudgetStatus::TokenExceeded | BudgetStatus::RequestExceeded
        )
    }
}

/// Read-only snapshot for observability and finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub status: BudgetStatus,
    pub message: String,
    pub budget: ResourceSet,
    pub usage: ResourceSet,
    pub remaining: ResourceSet,
}

/// Per-query accounting object. Owned by exactly one query session, but
/// touched from that session's parallel branches, so usage sits behind a
/// mutex.
#[derive(Debug)]
pub struct BudgetTracker {
    budget: ResourceSet,
    usage: Mutex<ResourceSet>,
}

impl BudgetTracker {
    /// Create a tracker with the given ceilings and all usage at zero.
    pub fn new(budget: ResourceSet) -> Self {
        Self {
            budget,
            usage: Mutex::new(ResourceSet::default()),
        }
    }

    /// The immutable ceilings.
    pub fn budget(&self) -> ResourceSet {
        self.budget
    }

    /// Snapshot of current usage.
    pub fn usage(&self) -> ResourceSet {
        *self.usage.lock()
    }

    /// Snapshot of remaining headroom (saturating at zero).
    pub fn remaining(&self) -> ResourceSet {
        let usage = self.usage();
        ResourceSet {
            time_ms: self.budget.time_ms.saturating_sub(usage.time_ms),
            tokens: self.budget.tokens.saturating_sub(usage.tokens),
            requests: self.budget.requests.saturating_sub(usage.requests),
        }
    }

    /// Atomic check-and-commit of `amount` against one resource.
    ///
    /// Returns `true` and commits the increment iff `usage + amount` stays
    /// within the ceiling; otherwise leaves usage untouched and returns
    /// `false`. Two parallel branches can never both take the last unit.
    pub fn try_consume(&self, resource: ResourceType, amount: u64) -> bool {
        let mut usage = self.usage.lock();
        let current = usage.get(resource);
        match current.checked_add(amount) {
            Some(next) if next <= self.budget.get(resource) => {
                *usage.get_mut(resource) = next;
                true
            }
            _ => false,
        }
    }

    /// Mark one resource fully consumed, in a single lock acquisition.
    ///
    /// Used when an increment overshoots the ceiling: the excess is work
    /// already done, so usage jumps straight to the ceiling rather than
    /// being left just under it where exhaustion would never be observed.
    pub fn drain(&self, resource: ResourceType) {
        let mut usage = self.usage.lock();
        *usage.get_mut(resource) = self.budget.get(resource);
    }

    /// Whether `costs` fits within the remaining budget for every resource.
    /// Read-only; holds the lock once so the answer is self-consistent.
    pub fn can_afford(&self, costs: ResourceSet) -> bool {
        let usage = self.usage.lock();
        ResourceType::PRIORITY.iter().all(|&resource| {
            usage
                .get(resource)
                .checked_add(costs.get(resource))
                .is_some_and(|next| next <= self.budget.get(resource))
        })
    }
}
