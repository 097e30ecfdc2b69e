//! The recovery manager: classification and decision application.

use chrono::Utc;
use tracing::{debug, warn};

use meridian_types::{
    ErrorKind, ErrorRecord, NodeResult, OrchestratorState, RoutingDecision,
};

use crate::strategy::RecoveryStrategy;

/// Backoff tuning for retry decisions.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum attempts per node (first try included).
    pub max_attempts: u32,
    /// Base backoff delay; attempt N waits `base * 2^(N-1)` seconds.
    pub backoff_base_secs: u64,
    /// Ceiling on any single backoff delay.
    pub backoff_cap_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_secs: 2,
            backoff_cap_secs: 60,
        }
    }
}

/// Classifies failed node outcomes and produces recovery decisions.
///
/// Stateless apart from configuration; constructed once per process and
/// injected wherever failures are handled.
#[derive(Debug, Clone, Default)]
pub struct RecoveryManager {
    config: RecoveryConfig,
}

impl RecoveryManager {
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// The classification for a failed result: the kind the adapter set at
    /// the source, or the free-text fallback when only a message exists.
    fn error_kind(node_result: &NodeResult) -> ErrorKind {
        node_result
            .error
            .as_ref()
            .map(|e| e.kind)
            .unwrap_or_else(|| ErrorKind::classify(node_result.error_message()))
    }

    /// Exponential backoff for a 1-based attempt number, capped.
    fn backoff_delay_secs(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(63);
        self.config
            .backoff_base_secs
            .saturating_mul(1u64 << exponent)
            .min(self.config.backoff_cap_secs)
    }

    /// Decide what to do about a failed node.
    ///
    /// Attempt exhaustion always wins over classification: at
    /// `attempt >= max_attempts` the decision is fail-permanently no matter
    /// what the error says. With attempts remaining, retryable kinds
    /// (rate-limited, transient, timeout) get a capped exponential backoff;
    /// permanent kinds are skipped when the node is optional for the routing
    /// decision (multi-search) and failed otherwise.
    pub fn create_strategy(
        &self,
        node_result: &NodeResult,
        attempt: u32,
        max_attempts: u32,
        routing: RoutingDecision,
    ) -> RecoveryStrategy {
        let kind = Self::error_kind(node_result);

        if attempt >= max_attempts {
            warn!(
                node = %node_result.node_name,
                attempt,
                max_attempts,
                ?kind,
                "attempts exhausted, failing node permanently"
            );
            return RecoveryStrategy::fail_permanently();
        }

        if kind.is_retryable() {
            let delay_secs = self.backoff_delay_secs(attempt);
            debug!(
                node = %node_result.node_name,
                attempt,
                delay_secs,
                ?kind,
                "scheduling retry with backoff"
            );
            return RecoveryStrategy::retry_with_backoff(delay_secs);
        }

        // Permanent error with attempts remaining: retrying cannot help, so
        // the node is abandoned. Under multi-search the siblings can still
        // answer; under single-search this node was the only source.
        match routing {
            RoutingDecision::MultiSearch => {
                debug!(node = %node_result.node_name, "skipping optional node after permanent error");
                RecoveryStrategy::skip_node()
            }
            RoutingDecision::SingleSearch => {
                warn!(node = %node_result.node_name, "permanent error on sole source, failing");
                RecoveryStrategy::fail_permanently()
            }
        }
    }

    /// The error record a decision appends to the audit trail.
    ///
    /// Parallel branches use this to build their state deltas; the record is
    /// merged into the shared state at the single-writer barrier together
    /// with the `recovery_*` marker from [`RecoveryStrategy::action`].
    pub fn recovery_record(
        &self,
        strategy: RecoveryStrategy,
        node_result: &NodeResult,
        node_name: &str,
    ) -> ErrorRecord {
        ErrorRecord {
            node: node_name.to_string(),
            error: node_result.error_message().to_string(),
            kind: Self::error_kind(node_result),
            timestamp: Utc::now(),
            strategy: strategy.action,
        }
    }

    /// Apply a decision to the state.
    ///
    /// Appends exactly one [`ErrorRecord`] and exactly one `recovery_*`
    /// marker to the audit trail; per-backend result slots are untouched.
    /// Sleeping for `strategy.delay()` is the scheduler's responsibility.
    pub fn execute_recovery(
        &self,
        strategy: RecoveryStrategy,
        state: &mut OrchestratorState,
        node_result: &NodeResult,
        node_name: &str,
    ) {
        let record = self.recovery_record(strategy, node_result, node_name);
        state.push_error(record);
        state.push_node(strategy.action.marker());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::{NodeError, RecoveryAction};

    fn manager() -> RecoveryManager {
        RecoveryManager::default()
    }

    fn failed(kind: ErrorKind, message: &str) -> NodeResult {
        NodeResult::failed("trials-search", 100, NodeError::new(kind, message))
    }

    #[test]
    fn test_exhausted_attempts_always_fail() {
        let m = manager();
        for kind in [
            ErrorKind::RateLimited,
            ErrorKind::Transient,
            ErrorKind::Timeout,
            ErrorKind::Permanent,
        ] {
            let strategy =
                m.create_strategy(&failed(kind, "whatever"), 3, 3, RoutingDecision::MultiSearch);
            assert_eq!(strategy.action, RecoveryAction::FailPermanently);
            assert!(!strategy.should_continue);
        }
    }

    #[test]
    fn test_retryable_kinds_get_backoff() {
        let m = manager();
        for kind in [ErrorKind::RateLimited, ErrorKind::Transient, ErrorKind::Timeout] {
            let strategy =
                m.create_strategy(&failed(kind, "err"), 1, 3, RoutingDecision::MultiSearch);
            assert_eq!(strategy.action, RecoveryAction::RetryWithBackoff);
            assert!(strategy.delay_secs > 0);
            assert!(strategy.should_continue);
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let m = manager();
        let d1 = m
            .create_strategy(
                &failed(ErrorKind::RateLimited, "429"),
                1,
                10,
                RoutingDecision::MultiSearch,
            )
            .delay_secs;
        let d2 = m
            .create_strategy(
                &failed(ErrorKind::RateLimited, "429"),
                2,
                10,
                RoutingDecision::MultiSearch,
            )
            .delay_secs;
        let d3 = m
            .create_strategy(
                &failed(ErrorKind::RateLimited, "429"),
                3,
                10,
                RoutingDecision::MultiSearch,
            )
            .delay_secs;
        assert_eq!(d1, 2);
        assert_eq!(d2, 4);
        assert_eq!(d3, 8);

        let deep = m
            .create_strategy(
                &failed(ErrorKind::Transient, "503"),
                9,
                10,
                RoutingDecision::MultiSearch,
            )
            .delay_secs;
        assert_eq!(deep, 60);
    }

    #[test]
    fn test_record_keeps_source_kind_over_text() {
        let m = manager();
        // Message text that free-text classification would call transient;
        // the adapter's kind must win.
        let result = failed(ErrorKind::Permanent, "backend rejected this query outright");
        let strategy = m.create_strategy(&result, 1, 3, RoutingDecision::MultiSearch);
        let record = m.recovery_record(strategy, &result, "trials-search");
        assert_eq!(record.kind, ErrorKind::Permanent);
        assert_eq!(strategy.action, RecoveryAction::SkipNode);
    }

    #[test]
    fn test_permanent_skips_optional_node() {
        let m = manager();
        let strategy = m.create_strategy(
            &failed(ErrorKind::Permanent, "validation failed"),
            1,
            3,
            RoutingDecision::MultiSearch,
        );
        assert_eq!(strategy.action, RecoveryAction::SkipNode);
        assert!(strategy.should_continue);
    }

    #[test]
    fn test_permanent_fails_sole_source() {
        let m = manager();
        let strategy = m.create_strategy(
            &failed(ErrorKind::Permanent, "validation failed"),
            1,
            3,
            RoutingDecision::SingleSearch,
        );
        assert_eq!(strategy.action, RecoveryAction::FailPermanently);
        assert!(!strategy.should_continue);
    }

    #[test]
    fn test_classifies_from_message_when_kind_missing() {
        let m = manager();
        // Adapter that only reports free text, no kind.
        let result = NodeResult {
            success: false,
            node_name: "literature-search".into(),
            latency_ms: 10,
            error: Some(NodeError::from_message("HTTP 429: rate limit exceeded")),
        };
        let strategy = m.create_strategy(&result, 1, 3, RoutingDecision::MultiSearch);
        assert_eq!(strategy.action, RecoveryAction::RetryWithBackoff);
    }

    #[test]
    fn test_execute_recovery_appends_exactly_one_of_each() {
        let m = manager();
        let mut state = OrchestratorState::new("q", RoutingDecision::MultiSearch);
        let result = failed(ErrorKind::RateLimited, "429");
        let strategy = m.create_strategy(&result, 1, 3, state.routing_decision);

        m.execute_recovery(strategy, &mut state, &result, "trials-search");
        assert_eq!(state.errors().len(), 1);
        assert_eq!(state.node_path().len(), 1);
        assert_eq!(state.node_path()[0], "recovery_retry_with_backoff");
        assert_eq!(state.errors()[0].node, "trials-search");
        assert_eq!(state.errors()[0].error, "429");
        assert_eq!(state.errors()[0].kind, ErrorKind::RateLimited);

        // A second application appends again without touching prior entries.
        m.execute_recovery(strategy, &mut state, &result, "trials-search");
        assert_eq!(state.errors().len(), 2);
        assert_eq!(state.node_path().len(), 2);
        assert_eq!(state.errors()[0].error, "429");
        assert!(state.trials_results.is_none());
    }
}
