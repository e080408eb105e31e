//! Retry policy and backoff

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::job::JobState;

/// Ceiling on any single delay, whatever the strategy or attempt count
pub const MAX_BACKOFF_SECS: u64 = 30 * 24 * 60 * 60;

/// Retry backoff strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    Constant {
        secs: u64,
    },
    Exponential {
        initial_secs: u64,
        multiplier: f64,
        /// Upper bound on a single delay
        max_secs: Option<u64>,
    },
}

impl BackoffStrategy {
    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    ///
    /// Never longer than [`MAX_BACKOFF_SECS`].
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = match self {
            Self::Constant { secs } => *secs,
            Self::Exponential {
                initial_secs,
                multiplier,
                max_secs,
            } => {
                let exp = attempt.saturating_sub(1).min(63) as i32;
                let secs = (*initial_secs as f64 * multiplier.powi(exp)).min(u64::MAX as f64);
                max_secs.map_or(secs as u64, |cap| (secs as u64).min(cap))
            }
        };
        Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
    }
}

/// Outcome of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to pending, claimable from `eligible_at` (immediately if `None`)
    Retry {
        eligible_at: Option<DateTime<Utc>>,
    },
    /// Retries exhausted
    Dead,
}

impl RetryDecision {
    pub fn state(&self) -> JobState {
        match self {
            Self::Retry { .. } => JobState::Pending,
            Self::Dead => JobState::Dead,
        }
    }

    pub fn eligible_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Retry { eligible_at } => *eligible_at,
            Self::Dead => None,
        }
    }
}

/// Decides where a job goes after a failed execution.
///
/// Without a backoff strategy a failed job is claimable again immediately,
/// so a command that fails fast is retried in a tight loop until it runs
/// out of retries.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetryPolicy {
    pub backoff: Option<BackoffStrategy>,
}

impl RetryPolicy {
    pub fn immediate() -> Self {
        Self { backoff: None }
    }

    pub fn with_backoff(backoff: BackoffStrategy) -> Self {
        Self {
            backoff: Some(backoff),
        }
    }

    /// `attempts` is the count after the failed attempt has been added.
    pub fn on_failure(&self, attempts: u32, max_retries: u32, now: DateTime<Utc>) -> RetryDecision {
        if attempts > max_retries {
            return RetryDecision::Dead;
        }

        let eligible_at = self.backoff.map(|b| {
            let delay = chrono::Duration::from_std(b.delay(attempts))
                .unwrap_or_else(|_| chrono::Duration::seconds(MAX_BACKOFF_SECS as i64));
            now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
        });

        RetryDecision::Retry { eligible_at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_only_after_budget_exceeded() {
        let policy = RetryPolicy::default();
        let now = Utc::now();

        assert_eq!(policy.on_failure(1, 1, now).state(), JobState::Pending);
        assert_eq!(policy.on_failure(2, 1, now), RetryDecision::Dead);
        assert_eq!(policy.on_failure(1, 0, now), RetryDecision::Dead);
        assert_eq!(policy.on_failure(3, 3, now).state(), JobState::Pending);
        assert_eq!(policy.on_failure(4, 3, now).state(), JobState::Dead);
    }

    #[test]
    fn test_default_policy_retries_immediately() {
        let decision = RetryPolicy::default().on_failure(1, 3, Utc::now());
        assert_eq!(decision, RetryDecision::Retry { eligible_at: None });
    }

    #[test]
    fn test_backoff_sets_eligibility() {
        let now = Utc::now();
        let policy = RetryPolicy::with_backoff(BackoffStrategy::Constant { secs: 30 });
        let decision = policy.on_failure(2, 3, now);
        assert_eq!(
            decision.eligible_at(),
            Some(now + chrono::Duration::seconds(30))
        );

        // Dead jobs carry no eligibility time
        assert_eq!(policy.on_failure(4, 3, now).eligible_at(), None);
    }

    #[test]
    fn test_backoff_strategy_constant() {
        let strategy = BackoffStrategy::Constant { secs: 5 };
        assert_eq!(strategy.delay(1).as_secs(), 5);
        assert_eq!(strategy.delay(10).as_secs(), 5);
    }

    #[test]
    fn test_backoff_strategy_exponential() {
        let strategy = BackoffStrategy::Exponential {
            initial_secs: 1,
            multiplier: 2.0,
            max_secs: None,
        };
        assert_eq!(strategy.delay(1).as_secs(), 1);
        assert_eq!(strategy.delay(2).as_secs(), 2);
        assert_eq!(strategy.delay(3).as_secs(), 4);
        assert_eq!(strategy.delay(4).as_secs(), 8);
    }

    #[test]
    fn test_backoff_strategy_exponential_cap() {
        let strategy = BackoffStrategy::Exponential {
            initial_secs: 2,
            multiplier: 3.0,
            max_secs: Some(60),
        };
        assert_eq!(strategy.delay(3).as_secs(), 18);
        assert_eq!(strategy.delay(5).as_secs(), 60);
        assert_eq!(strategy.delay(u32::MAX).as_secs(), 60);
    }

    #[test]
    fn test_huge_delays_are_capped() {
        let now = Utc::now();
        let ceiling = now + chrono::Duration::seconds(MAX_BACKOFF_SECS as i64);

        let uncapped = RetryPolicy::with_backoff(BackoffStrategy::Exponential {
            initial_secs: 1,
            multiplier: 2.0,
            max_secs: None,
        });
        for attempts in [44, 64, 1_000, u32::MAX - 1] {
            let decision = uncapped.on_failure(attempts, u32::MAX, now);
            assert_eq!(decision.state(), JobState::Pending);
            assert_eq!(decision.eligible_at(), Some(ceiling));
        }

        let constant = RetryPolicy::with_backoff(BackoffStrategy::Constant {
            secs: 10_000_000_000_000,
        });
        assert_eq!(constant.on_failure(1, 3, now).eligible_at(), Some(ceiling));
        assert_eq!(
            BackoffStrategy::Constant { secs: u64::MAX }.delay(1).as_secs(),
            MAX_BACKOFF_SECS
        );
    }

    #[test]
    fn test_eligibility_saturates_at_latest_date() {
        let near_end = DateTime::<Utc>::MAX_UTC - chrono::Duration::seconds(10);
        let policy = RetryPolicy::with_backoff(BackoffStrategy::Constant { secs: 60 });
        assert_eq!(
            policy.on_failure(1, 3, near_end).eligible_at(),
            Some(DateTime::<Utc>::MAX_UTC)
        );
    }
}
