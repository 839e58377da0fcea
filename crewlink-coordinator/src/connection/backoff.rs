//! Reconnection backoff schedule

use std::time::Duration;

/// Initial delay before the first reconnect attempt
pub const BASE_INTERVAL: Duration = Duration::from_millis(1000);

/// Upper bound on the reconnect delay
pub const MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Attempts before the manager gives up and goes terminal
pub const MAX_ATTEMPTS: u32 = 10;

/// Delay before reconnect attempt `attempt` (1-based):
/// `min(base * 2^(attempt-1), max)`
pub fn delay_for_attempt(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    let millis = (BASE_INTERVAL.as_millis() as u64).saturating_mul(1u64 << exp);
    Duration::from_millis(millis.min(MAX_INTERVAL.as_millis() as u64))
}
