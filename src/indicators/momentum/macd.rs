//! MACD (Moving Average Convergence Divergence) indicator
//!
//! MACD = EMA(12) - EMA(26)
//! Signal = EMA(9) of MACD

use crate::indicators::trend::ema::Ema;

pub const FAST_PERIOD: usize = 12;
pub const SLOW_PERIOD: usize = 26;
pub const SIGNAL_PERIOD: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdState {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

impl Default for MacdState {
    fn default() -> Self {
        Self {
            fast: Ema::with_window(FAST_PERIOD),
            slow: Ema::with_window(SLOW_PERIOD),
            signal: Ema::with_window(SIGNAL_PERIOD),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdOutput {
    pub macd: f64,
    pub signal: f64,
}

impl MacdOutput {
    pub fn histogram(&self) -> f64 {
        self.macd - self.signal
    }
}

pub fn step(state: MacdState, close: f64) -> (MacdState, MacdOutput) {
    let (fast, fast_value) = state.fast.next(close);
    let (slow, slow_value) = state.slow.next(close);
    let macd = fast_value - slow_value;
    let (signal_ema, signal) = state.signal.next(macd);

    (
        MacdState {
            fast,
            slow,
            signal: signal_ema,
        },
        MacdOutput { macd, signal },
    )
}
