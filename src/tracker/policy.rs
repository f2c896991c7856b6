// Percent computation and the throttle delta rule

pub const DEFAULT_MIN_DELTA: u8 = 5;
pub const COMPLETE: u8 = 100;

/// Percent of the video played, or `None` while the duration is unknown.
pub fn compute_percent(current_time: f64, duration: f64) -> Option<u8> {
    if !duration.is_finite() || duration <= 0.0 || !current_time.is_finite() {
        return None;
    }
    let percent = (current_time / duration * 100.0).round();
    Some(percent.clamp(0.0, f64::from(COMPLETE)) as u8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    /// Minimum percent-point change since the last reported value.
    pub min_delta: u8,
    /// Never report a value below the last reported one.
    pub monotonic: bool,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        ThrottlePolicy {
            min_delta: DEFAULT_MIN_DELTA,
            monotonic: false,
        }
    }
}

impl ThrottlePolicy {
    /// Whether `percent` should be pushed given the last value the server acknowledged.
    /// Completion is always pushed unless the server already has it.
    pub fn should_sync(&self, last_reported: u8, percent: u8) -> bool {
        if percent >= COMPLETE {
            return last_reported < COMPLETE;
        }
        if self.monotonic && percent < last_reported {
            return false;
        }
        percent.abs_diff(last_reported) >= self.min_delta
    }
}
