//! Exponential backoff with optional jitter.

use std::time::Duration;

use rand::Rng;

/// Delay to wait after the failed attempt numbered `attempt` (0-based).
///
/// `min(cap, base * 2^attempt)`.
pub fn calculate_backoff(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.saturating_mul(factor).min(cap)
}

/// Same as [`calculate_backoff`] plus up to 10% random jitter, still capped.
pub fn calculate_backoff_with_jitter(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let delay = calculate_backoff(attempt, base, cap);
    let jitter_range = delay.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    (delay + Duration::from_millis(jitter)).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(100);

    #[test]
    fn test_backoff_calculation() {
        let cap = Duration::from_secs(2);
        assert_eq!(calculate_backoff(0, BASE, cap), Duration::from_millis(100));
        assert_eq!(calculate_backoff(1, BASE, cap), Duration::from_millis(200));
        assert_eq!(calculate_backoff(2, BASE, cap), Duration::from_millis(400));
        assert_eq!(calculate_backoff(10, BASE, cap), cap);
    }

    #[test]
    fn test_backoff_never_overflows() {
        let cap = Duration::from_secs(30);
        assert_eq!(calculate_backoff(u32::MAX, BASE, cap), cap);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let cap = Duration::from_millis(1000);
        for attempt in 0..6 {
            let plain = calculate_backoff(attempt, BASE, cap);
            let jittered = calculate_backoff_with_jitter(attempt, BASE, cap);
            assert!(jittered >= plain);
            assert!(jittered <= cap);
        }
    }
}
