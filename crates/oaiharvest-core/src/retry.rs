//! Backoff between requeue passes

use std::time::{Duration, Instant};

use crate::shutdown::CancelToken;

/// Granularity of the cancellation check while pausing
const PAUSE_TICK: Duration = Duration::from_millis(100);

/// Exponential backoff: `base * 2^(attempt-1)` (base, 2·base, 4·base, ...)
pub fn backoff_duration(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `true` if the full pause elapsed, `false` if it was cut short.
pub fn pause(duration: Duration, cancel: &CancelToken) -> bool {
    let until = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= until {
            return true;
        }
        std::thread::sleep(PAUSE_TICK.min(until - now));
    }
}
