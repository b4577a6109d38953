//! Bounded restart budget for supervised loops
//!
//! Each failure spends one unit of the budget. While the budget lasts the
//! supervisor is told to restart; once it is spent the circuit opens and
//! stays open. There is no timed half-open state: only a fresh budget
//! (a new process) closes it again.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Restart policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// Failures tolerated before giving up
    pub max_restarts: u32,
    /// Pause between stopping and starting again
    pub restart_delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            restart_delay: Duration::from_secs(5),
        }
    }
}

/// Circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Failures are answered with restarts
    Closed,
    /// Budget spent, no further restarts
    Open,
}

/// What the supervisor should do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart after `delay`; `attempt` counts from 1
    Restart { attempt: u32, delay: Duration },
    /// Stop permanently
    GiveUp { failures: u32 },
}

/// Failure counter with a fixed ceiling
#[derive(Debug, Clone)]
pub struct RestartBudget {
    policy: RestartPolicy,
    failures: u32,
    state: CircuitState,
}

impl RestartBudget {
    #[must_use]
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            state: CircuitState::Closed,
        }
    }

    /// Record a failure and decide the response
    ///
    /// The counter is incremented first; a count below `max_restarts`
    /// restarts, a count at or above it opens the circuit.
    pub fn record_failure(&mut self) -> RestartDecision {
        if self.state == CircuitState::Open {
            return RestartDecision::GiveUp {
                failures: self.failures,
            };
        }

        self.failures = self.failures.saturating_add(1);
        if self.failures < self.policy.max_restarts {
            RestartDecision::Restart {
                attempt: self.failures,
                delay: self.policy.restart_delay,
            }
        } else {
            self.state = CircuitState::Open;
            RestartDecision::GiveUp {
                failures: self.failures,
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }

    #[inline]
    #[must_use]
    pub fn policy(&self) -> &RestartPolicy {
        &self.policy
    }
}

impl Default for RestartBudget {
    fn default() -> Self {
        Self::new(RestartPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restarts_until_budget_spent() {
        let mut budget = RestartBudget::new(RestartPolicy {
            max_restarts: 3,
            restart_delay: Duration::from_secs(5),
        });

        assert_eq!(
            budget.record_failure(),
            RestartDecision::Restart {
                attempt: 1,
                delay: Duration::from_secs(5)
            }
        );
        assert!(matches!(
            budget.record_failure(),
            RestartDecision::Restart { attempt: 2, .. }
        ));
        assert_eq!(
            budget.record_failure(),
            RestartDecision::GiveUp { failures: 3 }
        );
        assert!(budget.is_open());
    }

    #[test]
    fn open_circuit_stays_open() {
        let mut budget = RestartBudget::new(RestartPolicy {
            max_restarts: 1,
            restart_delay: Duration::ZERO,
        });
        assert!(matches!(budget.record_failure(), RestartDecision::GiveUp { .. }));

        for _ in 0..10 {
            assert_eq!(
                budget.record_failure(),
                RestartDecision::GiveUp { failures: 1 }
            );
        }
        assert_eq!(budget.failures(), 1);
        assert_eq!(budget.state(), CircuitState::Open);
    }

    #[test]
    fn default_policy_allows_five_failures() {
        let mut budget = RestartBudget::default();
        let restarts = (0..5)
            .map(|_| budget.record_failure())
            .filter(|d| matches!(d, RestartDecision::Restart { .. }))
            .count();
        assert_eq!(restarts, 4);
        assert!(budget.is_open());
        assert_eq!(budget.failures(), 5);
    }
}
