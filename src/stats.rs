//! Small helpers shared by the statistics structs.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Running mean: `avg += (x - avg) / n` where `n` counts samples so far.
pub fn running_average(current_ms: f64, samples: u64, sample: Duration) -> f64 {
    if samples == 0 {
        return 0.0;
    }
    let x = sample.as_secs_f64() * 1000.0;
    current_ms + (x - current_ms) / samples as f64
}

/// Milliseconds since the Unix epoch, for serializable timestamps.
pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
