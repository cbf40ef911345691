//! ADX (Average Directional Index) indicator
//!
//! +DM/-DM are smoothed with the same EMA period as ATR; +DI/-DI are scaled by
//! the current ATR and DX is smoothed into ADX.

use crate::indicators::trend::ema::Ema;
use crate::indicators::volatility::atr::DEFAULT_ATR_PERIOD;
use crate::models::Bar;

/// Below this magnitude a denominator is treated as zero.
pub const DIVISION_GUARD: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdxState {
    prev_high: Option<f64>,
    prev_low: Option<f64>,
    apdm: Ema,
    andm: Ema,
    adx: Ema,
}

impl AdxState {
    pub fn new(period: usize) -> Self {
        Self {
            prev_high: None,
            prev_low: None,
            apdm: Ema::with_window(period),
            andm: Ema::with_window(period),
            adx: Ema::with_window(period),
        }
    }
}

impl Default for AdxState {
    fn default() -> Self {
        Self::new(DEFAULT_ATR_PERIOD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdxOutput {
    pub pdi: f64,
    pub ndi: f64,
    pub adx: f64,
}

/// Returns `(+DM, -DM)`. Only the larger move counts; ties yield both zero.
pub fn directional_movement(high: f64, low: f64, prev_high: f64, prev_low: f64) -> (f64, f64) {
    let up_move = high - prev_high;
    let down_move = prev_low - low;
    let plus_dm = if up_move > down_move { up_move.max(0.0) } else { 0.0 };
    let minus_dm = if down_move > up_move { down_move.max(0.0) } else { 0.0 };
    (plus_dm, minus_dm)
}

pub fn step(state: AdxState, bar: &Bar, atr: f64) -> (AdxState, AdxOutput) {
    let prev_high = state.prev_high.unwrap_or(bar.high);
    let prev_low = state.prev_low.unwrap_or(bar.low);
    let (plus_dm, minus_dm) = directional_movement(bar.high, bar.low, prev_high, prev_low);

    let (apdm_ema, apdm) = state.apdm.next(plus_dm);
    let (andm_ema, andm) = state.andm.next(minus_dm);

    let (pdi, ndi) = if atr.abs() < DIVISION_GUARD {
        (0.0, 0.0)
    } else {
        (100.0 * apdm / atr, 100.0 * andm / atr)
    };

    let di_sum = pdi + ndi;
    let dx = if di_sum.abs() < DIVISION_GUARD {
        0.0
    } else {
        100.0 * (pdi - ndi).abs() / di_sum.abs()
    };
    let (adx_ema, adx) = state.adx.next(dx);

    (
        AdxState {
            prev_high: Some(bar.high),
            prev_low: Some(bar.low),
            apdm: apdm_ema,
            andm: andm_ema,
            adx: adx_ema,
        },
        AdxOutput { pdi, ndi, adx },
    )
}
