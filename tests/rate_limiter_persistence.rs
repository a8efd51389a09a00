//! Rate limiter persistence and window properties.

use proptest::prelude::*;
use scribe_core::resilience::{RateLimit, RateLimiter};
use std::collections::HashMap;
use std::time::Duration;

fn limiter(max_calls: u32, window_seconds: u64) -> RateLimiter {
    let mut limits = HashMap::new();
    limits.insert(
        "deepgram".to_string(),
        RateLimit::new(max_calls, window_seconds),
    );
    RateLimiter::new(limits, RateLimit::default())
}

#[test]
fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rate_limits.json");

    // First process: exhaust the budget and flush state.
    {
        let limiter = limiter(2, 60).with_persistence(path.clone()).unwrap();
        assert!(limiter.check_rate_limit("deepgram", None).allowed);
        assert!(limiter.check_rate_limit("deepgram", None).allowed);
        assert!(!limiter.check_rate_limit("deepgram", None).allowed);
        limiter.save_now().unwrap();
    }

    // Second process: the restored window still denies the third call.
    let restarted = limiter(2, 60).with_persistence(path).unwrap();
    assert_eq!(restarted.in_window_count("deepgram", None), 2);
    let decision = restarted.check_rate_limit("deepgram", None);
    assert!(!decision.allowed);
    assert!(decision.retry_in.is_some());
}

#[test]
fn reload_is_idempotent_after_pruning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rate_limits.json");

    {
        let limiter = limiter(5, 1).with_persistence(path.clone()).unwrap();
        limiter.check_rate_limit("deepgram", None);
        limiter.save_now().unwrap();
    }

    // Wait for the 1-second window to expire, then load twice.
    std::thread::sleep(Duration::from_millis(1100));

    let first = limiter(5, 1).with_persistence(path.clone()).unwrap();
    assert_eq!(first.in_window_count("deepgram", None), 0);
    first.save_now().unwrap();

    let second = limiter(5, 1).with_persistence(path).unwrap();
    assert_eq!(second.in_window_count("deepgram", None), 0);
}

#[test]
fn corrupt_state_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rate_limits.json");
    std::fs::write(&path, b"{not json").unwrap();

    let result = limiter(5, 60).with_persistence(path);
    assert!(result.is_err());
}

proptest! {
    /// However the check sequence interleaves allowed and denied calls, the
    /// recorded in-window count never exceeds the configured budget.
    #[test]
    fn window_never_exceeds_budget(max_calls in 1u32..10, attempts in 1usize..100) {
        let limiter = limiter(max_calls, 60);

        for _ in 0..attempts {
            let decision = limiter.check_rate_limit("deepgram", None);
            let in_window = limiter.in_window_count("deepgram", None);
            prop_assert!(in_window <= max_calls as usize);
            if decision.allowed {
                prop_assert!(in_window >= 1);
            } else {
                prop_assert_eq!(in_window, max_calls as usize);
                prop_assert!(decision.retry_in.is_some());
            }
        }
    }
}
