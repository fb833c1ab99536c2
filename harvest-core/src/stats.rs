//! Speed/ETA derivation from per-item download durations.

/// How many of the most recent completed items feed the speed estimate.
pub const SPEED_WINDOW: usize = 10;

/// Documents per second from the mean of recent per-item durations.
/// `None` when there are no samples or the mean is not positive.
pub fn speed_from_recent(recent_secs: &[f64]) -> Option<f64> {
    if recent_secs.is_empty() {
        return None;
    }
    let mean = recent_secs.iter().sum::<f64>() / recent_secs.len() as f64;
    if mean > 0.0 { Some(1.0 / mean) } else { None }
}

/// Seconds until `remaining` items finish at `speed` docs/second. Absent
/// when speed is unavailable or nothing remains.
pub fn estimate_remaining_seconds(remaining: i32, speed: Option<f64>) -> Option<f64> {
    let speed = speed?;
    if speed > 0.0 && remaining > 0 {
        Some(remaining as f64 / speed)
    } else {
        None
    }
}
