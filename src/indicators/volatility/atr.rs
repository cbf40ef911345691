//! ATR (Average True Range) indicator

use crate::indicators::trend::ema::Ema;
use crate::models::Bar;

pub const DEFAULT_ATR_PERIOD: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtrState {
    prev_close: Option<f64>,
    atr: Ema,
}

impl AtrState {
    pub fn new(period: usize) -> Self {
        Self {
            prev_close: None,
            atr: Ema::with_window(period),
        }
    }
}

impl Default for AtrState {
    fn default() -> Self {
        Self::new(DEFAULT_ATR_PERIOD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtrOutput {
    pub tr: f64,
    pub atr: f64,
}

/// `max(high - low, |high - prevClose|, |low - prevClose|)`
pub fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

/// On a symbol's first bar the previous close is taken as the current high,
/// which keeps the opening range at `high - low`.
pub fn step(state: AtrState, bar: &Bar) -> (AtrState, AtrOutput) {
    let prev_close = state.prev_close.unwrap_or(bar.high);
    let tr = true_range(bar.high, bar.low, prev_close);
    let (atr_ema, atr) = state.atr.next(tr);

    (
        AtrState {
            prev_close: Some(bar.close),
            atr: atr_ema,
        },
        AtrOutput { tr, atr },
    )
}
