//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before the `attempt`-th retry: `base * 2^(attempt-1)`, capped at
/// `max`, plus up to 10% jitter. Attempt 0 means no delay.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially() {
        let first = calculate_backoff(1, 500, 30_000);
        assert!(first >= Duration::from_millis(500) && first < Duration::from_millis(550));

        let third = calculate_backoff(3, 500, 30_000);
        assert!(third >= Duration::from_millis(2_000) && third < Duration::from_millis(2_200));
    }

    #[test]
    fn capped_at_max_plus_jitter() {
        let delay = calculate_backoff(40, 500, 30_000);
        assert!(delay >= Duration::from_millis(30_000));
        assert!(delay < Duration::from_millis(33_000));
    }

    #[test]
    fn zeroth_attempt_is_immediate() {
        assert_eq!(calculate_backoff(0, 500, 30_000), Duration::ZERO);
    }
}
