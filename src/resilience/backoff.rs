//! Backoff delay calculation with optional jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `initial * factor^(attempt - 1)`
    #[default]
    Exponential,
    /// `initial * attempt`
    Linear,
    /// `initial` every time.
    Fixed,
}

/// Delay to wait after the given (1-based) failed attempt, before jitter.
///
/// Always capped at `max_ms`. Attempt 0 means "no attempt yet" and yields zero.
pub fn calculate_backoff(
    strategy: BackoffStrategy,
    attempt: u32,
    initial_ms: u64,
    max_ms: u64,
    factor: f64,
) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let delay_ms = match strategy {
        BackoffStrategy::Exponential => {
            let exp = factor.max(1.0).powi(attempt.saturating_sub(1) as i32);
            let raw = initial_ms as f64 * exp;
            if raw.is_finite() && raw < u64::MAX as f64 {
                raw as u64
            } else {
                u64::MAX
            }
        }
        BackoffStrategy::Linear => initial_ms.saturating_mul(attempt as u64),
        BackoffStrategy::Fixed => initial_ms,
    };

    Duration::from_millis(delay_ms.min(max_ms))
}

/// Spread a delay by up to ±10% so concurrent callers do not retry in lockstep.
///
/// The result never exceeds `max`.
pub fn apply_jitter(delay: Duration, max: Duration) -> Duration {
    let delay_ms = delay.as_millis() as u64;
    let jitter_range = delay_ms / 10;
    if jitter_range == 0 {
        return delay.min(max);
    }

    let offset = rand::thread_rng().gen_range(0..=jitter_range * 2);
    let jittered = (delay_ms + offset).saturating_sub(jitter_range);
    Duration::from_millis(jittered).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_doubles_until_cap() {
        let delays: Vec<u64> = (1..=6)
            .map(|a| calculate_backoff(BackoffStrategy::Exponential, a, 1000, 10_000, 2.0).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10_000, 10_000]);
    }

    #[test]
    fn test_linear_and_fixed() {
        assert_eq!(
            calculate_backoff(BackoffStrategy::Linear, 3, 100, 2000, 2.0),
            Duration::from_millis(300)
        );
        assert_eq!(
            calculate_backoff(BackoffStrategy::Fixed, 7, 250, 2000, 2.0),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_zero_attempt_and_huge_attempt() {
        assert_eq!(
            calculate_backoff(BackoffStrategy::Exponential, 0, 100, 1000, 2.0),
            Duration::ZERO
        );
        assert_eq!(
            calculate_backoff(BackoffStrategy::Exponential, 500, 100, 1000, 2.0),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let max = Duration::from_millis(10_000);
        for _ in 0..200 {
            let d = apply_jitter(Duration::from_millis(1000), max).as_millis();
            assert!((900..=1100).contains(&d), "jittered delay {} out of band", d);
        }
        for _ in 0..50 {
            assert!(apply_jitter(max, max) <= max);
        }
    }
}
