//! Reconnect backoff.
//!
//! Two strategies exist and a [`ReconnectPolicy`] is bound to exactly one of
//! them for its whole life, so a loop never mixes delay sequences:
//!
//! - [`BackoffStrategy::AttemptBounded`]: `5s * 1.5^n` for `n` in `0..5`,
//!   then a flat 30s pause after which the sequence starts over.
//! - [`BackoffStrategy::CappedExponential`]: `min(5s * 2^min(n, 5), 120s)`,
//!   growing until a session succeeds. This drives the controller's
//!   background loop unless configured otherwise.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

const BASE_DELAY_MS: u64 = 5_000;

/// Attempts the bounded strategy makes before its long pause.
pub const BOUNDED_MAX_ATTEMPTS: u32 = 5;
/// Pause taken by the bounded strategy once its attempts are used up.
pub const BOUNDED_PAUSE: Duration = Duration::from_secs(30);

const CAPPED_MAX_EXPONENT: u32 = 5;
/// Upper bound of the capped strategy.
pub const CAPPED_MAX_DELAY: Duration = Duration::from_secs(120);

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BackoffStrategy {
    AttemptBounded,
    #[default]
    CappedExponential,
}

/// `5s * 1.5^attempt`.
pub fn attempt_bounded_delay(attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    Duration::from_secs_f64(Duration::from_millis(BASE_DELAY_MS).as_secs_f64() * 1.5_f64.powi(exponent))
}

/// `min(5s * 2^min(attempt, 5), 120s)`.
pub fn capped_exponential_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(CAPPED_MAX_EXPONENT);
    Duration::from_millis(BASE_DELAY_MS << exponent).min(CAPPED_MAX_DELAY)
}

/// Attempt counter plus the strategy that turns it into delays.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    strategy: BackoffStrategy,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(strategy: BackoffStrategy) -> Self {
        Self {
            strategy,
            attempt: 0,
        }
    }

    pub fn strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    /// Attempts made since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt; advances the counter.
    pub fn next_delay(&mut self) -> Duration {
        match self.strategy {
            BackoffStrategy::AttemptBounded => {
                if self.attempt >= BOUNDED_MAX_ATTEMPTS {
                    self.attempt = 0;
                    BOUNDED_PAUSE
                } else {
                    let delay = attempt_bounded_delay(self.attempt);
                    self.attempt += 1;
                    delay
                }
            }
            BackoffStrategy::CappedExponential => {
                let delay = capped_exponential_delay(self.attempt);
                self.attempt = self.attempt.saturating_add(1);
                delay
            }
        }
    }

    /// Called on every successful Connected transition and on forced teardown.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_delays_follow_one_and_a_half_growth() {
        let expected_ms = [5_000.0, 7_500.0, 11_250.0, 16_875.0, 25_312.5];
        for (n, ms) in expected_ms.iter().enumerate() {
            let n = u32::try_from(n).unwrap();
            assert_eq!(
                attempt_bounded_delay(n),
                Duration::from_secs_f64(ms / 1000.0),
                "attempt {n}"
            );
        }
    }

    #[test]
    fn bounded_policy_pauses_once_then_restarts() {
        let mut policy = ReconnectPolicy::new(BackoffStrategy::AttemptBounded);
        let first: Vec<Duration> = (0..5).map(|_| policy.next_delay()).collect();
        assert_eq!(first[0], Duration::from_secs(5));
        assert_eq!(policy.attempt(), 5);

        assert_eq!(policy.next_delay(), Duration::from_secs(30));
        assert_eq!(policy.attempt(), 0);

        assert_eq!(policy.next_delay(), Duration::from_secs(5));
        assert_eq!(policy.next_delay(), Duration::from_millis(7_500));
    }

    #[test]
    fn capped_delays_saturate() {
        let delays: Vec<u128> = (0..10).map(|n| capped_exponential_delay(n).as_millis()).collect();
        assert_eq!(
            delays,
            vec![5_000, 10_000, 20_000, 40_000, 80_000, 120_000, 120_000, 120_000, 120_000, 120_000]
        );
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(capped_exponential_delay(u32::MAX), CAPPED_MAX_DELAY);
    }

    #[test]
    fn capped_policy_never_resets_on_its_own() {
        let mut policy = ReconnectPolicy::new(BackoffStrategy::CappedExponential);
        for _ in 0..20 {
            policy.next_delay();
        }
        assert_eq!(policy.attempt(), 20);
        assert_eq!(policy.next_delay(), CAPPED_MAX_DELAY);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut policy = ReconnectPolicy::new(BackoffStrategy::CappedExponential);
        policy.next_delay();
        policy.next_delay();
        policy.reset();
        assert_eq!(policy.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn strategy_names() {
        assert_eq!(BackoffStrategy::AttemptBounded.to_string(), "attempt-bounded");
        assert_eq!(
            "capped-exponential".parse::<BackoffStrategy>().unwrap(),
            BackoffStrategy::CappedExponential
        );
    }
}
