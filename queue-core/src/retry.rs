//! `ComputeNextTry` (spec.md §4.5): turns a `BackoffSpec` and an attempt
//! count into the next `next_try` timestamp, or `None` once the entry has
//! exhausted its retries.
//!
//! Grounded on `hook-common::retry::RetryPolicy::time_until_next_retry`'s
//! shape (`initial_interval * backoff_coefficient.pow(attempt)`, capped at
//! a maximum), generalized to the two-mode (`linear`/`exponential`) curve
//! this queue supports.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::duration::{BackoffMode, BackoffSpec};

/// `max_retries == 0` means unlimited retries, matching spec.md §4.5's
/// "a `MaxRetries` of zero means no cap" note.
pub fn compute_next_try(
    backoff: &BackoffSpec,
    retries: u32,
    max_retries: u32,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if max_retries != 0 && retries >= max_retries {
        return None;
    }

    let delay = match backoff.mode {
        BackoffMode::Linear => backoff.step.saturating_mul(retries.max(1)),
        // step * 2^(retries - 1): the first retry waits one step, then the
        // wait doubles each retry after that.
        BackoffMode::Exponential => backoff
            .step
            .checked_mul(2u32.saturating_pow(retries.saturating_sub(1)))
            .unwrap_or(backoff.max),
    };

    let delay = if retries == 0 { backoff.initial } else { delay };
    let delay = delay.min(backoff.max);

    let delay =
        ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(i64::MAX / 2));

    Some(now + delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spec(mode: BackoffMode) -> BackoffSpec {
        BackoffSpec {
            initial: Duration::from_secs(1),
            mode,
            step: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }

    #[test]
    fn first_retry_uses_initial_interval() {
        let now = Utc::now();
        let next = compute_next_try(&spec(BackoffMode::Linear), 0, 5, now).unwrap();
        assert_eq!(next - now, ChronoDuration::seconds(1));
    }

    #[test]
    fn linear_grows_by_step_per_retry() {
        let now = Utc::now();
        let next = compute_next_try(&spec(BackoffMode::Linear), 3, 5, now).unwrap();
        assert_eq!(next - now, ChronoDuration::seconds(3));
    }

    #[test]
    fn exponential_doubles_and_caps_at_max() {
        let now = Utc::now();
        let next = compute_next_try(&spec(BackoffMode::Exponential), 10, 0, now).unwrap();
        assert_eq!(next - now, ChronoDuration::seconds(60));
    }

    #[test]
    fn exhausted_retries_return_none() {
        let now = Utc::now();
        assert!(compute_next_try(&spec(BackoffMode::Linear), 5, 5, now).is_none());
    }

    #[test]
    fn zero_max_retries_means_unlimited() {
        let now = Utc::now();
        assert!(compute_next_try(&spec(BackoffMode::Linear), 1000, 0, now).is_some());
    }
}
