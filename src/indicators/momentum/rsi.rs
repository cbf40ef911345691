//! RSI (Relative Strength Index) indicator
//!
//! Gains and losses are percentage changes of the close, smoothed with
//! EMA(alpha = 2/15).
//! RSI = 100 - (100 / (1 + gainMA / lossMA))

use crate::indicators::trend::ema::Ema;

pub const RSI_ALPHA: f64 = 2.0 / 15.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RsiState {
    prev_close: Option<f64>,
    gain: Ema,
    loss: Ema,
}

impl Default for RsiState {
    fn default() -> Self {
        Self {
            prev_close: None,
            gain: Ema::with_alpha(RSI_ALPHA),
            loss: Ema::with_alpha(RSI_ALPHA),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RsiOutput {
    pub pct_change: f64,
    pub rsi: f64,
}

/// Fractional change from the previous close; 0 without a usable reference.
pub fn pct_change(close: f64, prev_close: Option<f64>) -> f64 {
    match prev_close {
        Some(prev) if prev != 0.0 => (close - prev) / prev,
        _ => 0.0,
    }
}

pub fn step(state: RsiState, close: f64) -> (RsiState, RsiOutput) {
    let change = pct_change(close, state.prev_close);
    let (gain_ema, gain_ma) = state.gain.next(change.max(0.0));
    let (loss_ema, loss_ma) = state.loss.next((-change).max(0.0));

    let rsi = if loss_ma <= 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + gain_ma / loss_ma)
    };

    (
        RsiState {
            prev_close: Some(close),
            gain: gain_ema,
            loss: loss_ema,
        },
        RsiOutput {
            pct_change: change,
            rsi,
        },
    )
}
