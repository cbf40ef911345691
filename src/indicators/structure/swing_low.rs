//! Swing low: lowest close over the trailing 20 bars, current bar included.

use super::history::CloseHistory;

pub const SWING_LOW_WINDOW: usize = 20;

pub fn step(history: &CloseHistory, close: f64) -> f64 {
    history
        .recent(SWING_LOW_WINDOW - 1)
        .fold(close, f64::min)
}
