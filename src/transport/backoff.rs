//! Linear retry backoff.

use std::time::Duration;

/// Delay before attempt `attempt` (1-based): `retry_delay * (attempt - 1)`.
///
/// The first attempt never waits.
pub fn linear_backoff(attempt: u32, retry_delay: Duration) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    retry_delay.saturating_mul(attempt - 1)
}
