//! Coppock Curve
//!
//! raw = ROC(308) + ROC(220), smoothed with EMA(alpha = 2/221).
//! Both ROC terms are 0 until 308 previous closes are available.

use crate::indicators::structure::history::{CloseHistory, MAX_LOOKBACK};
use crate::indicators::trend::ema::Ema;

pub const LONG_ROC_PERIOD: usize = MAX_LOOKBACK;
pub const SHORT_ROC_PERIOD: usize = 220;
pub const SMOOTHING_ALPHA: f64 = 2.0 / 221.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoppockState {
    curve: Ema,
}

impl Default for CoppockState {
    fn default() -> Self {
        Self {
            curve: Ema::with_alpha(SMOOTHING_ALPHA),
        }
    }
}

/// Percentage rate of change against a reference close; 0 for a zero reference.
pub fn rate_of_change(close: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        0.0
    } else {
        100.0 * (close - reference) / reference
    }
}

pub fn step(state: CoppockState, history: &CloseHistory, close: f64) -> (CoppockState, f64) {
    let raw = if history.len() < LONG_ROC_PERIOD {
        0.0
    } else {
        let long = history
            .ago(LONG_ROC_PERIOD)
            .map(|reference| rate_of_change(close, reference))
            .unwrap_or(0.0);
        let short = history
            .ago(SHORT_ROC_PERIOD)
            .map(|reference| rate_of_change(close, reference))
            .unwrap_or(0.0);
        long + short
    };

    let (curve, value) = state.curve.next(raw);
    (CoppockState { curve }, value)
}
