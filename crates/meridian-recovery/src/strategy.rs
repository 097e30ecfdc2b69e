//! The recovery decision computed after a node failure.

use std::time::Duration;

use meridian_types::RecoveryAction;
use serde::{Deserialize, Serialize};

/// What to do about a failed node, and whether the query keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    pub action: RecoveryAction,
    /// Backoff delay before the next attempt. Zero for non-retry actions.
    pub delay_secs: u64,
    /// Whether the query session should continue past this node.
    pub should_continue: bool,
}

impl RecoveryStrategy {
    pub fn retry_with_backoff(delay_secs: u64) -> Self {
        Self {
            action: RecoveryAction::RetryWithBackoff,
            delay_secs,
            should_continue: true,
        }
    }

    pub fn retry_immediately() -> Self {
        Self {
            action: RecoveryAction::RetryImmediately,
            delay_secs: 0,
            should_continue: true,
        }
    }

    pub fn skip_node() -> Self {
        Self {
            action: RecoveryAction::SkipNode,
            delay_secs: 0,
            should_continue: true,
        }
    }

    pub fn fail_permanently() -> Self {
        Self {
            action: RecoveryAction::FailPermanently,
            delay_secs: 0,
            should_continue: false,
        }
    }

    /// Whether the scheduler should attempt the node again.
    pub fn is_retry(&self) -> bool {
        matches!(
            self.action,
            RecoveryAction::RetryWithBackoff | RecoveryAction::RetryImmediately
        )
    }

    /// The backoff delay as a [`Duration`].
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}
