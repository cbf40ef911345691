//! MFI (Money Flow Index) indicator
//!
//! Raw money flow `typical_price * volume` is split into positive and negative
//! flow by the direction of the typical price, each side smoothed with
//! EMA(alpha = 2/15).

use crate::indicators::trend::ema::Ema;
use crate::models::Bar;

pub const MFI_ALPHA: f64 = 2.0 / 15.0;
/// Flow ratio used when there is no negative flow to divide by.
pub const MAX_FLOW_RATIO: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MfiState {
    prev_typical_price: Option<f64>,
    prev_mfi: Option<f64>,
    positive_flow: Ema,
    negative_flow: Ema,
}

impl Default for MfiState {
    fn default() -> Self {
        Self {
            prev_typical_price: None,
            prev_mfi: None,
            positive_flow: Ema::with_alpha(MFI_ALPHA),
            negative_flow: Ema::with_alpha(MFI_ALPHA),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MfiOutput {
    pub mfi: f64,
    pub mfi_delta: f64,
}

pub fn typical_price(bar: &Bar) -> f64 {
    (bar.high + bar.low + bar.close) / 3.0
}

pub fn step(state: MfiState, bar: &Bar) -> (MfiState, MfiOutput) {
    let typical = typical_price(bar);
    let raw_flow = typical * bar.volume;

    let (positive, negative) = match state.prev_typical_price {
        Some(prev) if typical > prev => (raw_flow, 0.0),
        Some(prev) if typical < prev => (0.0, raw_flow),
        _ => (0.0, 0.0),
    };

    let (positive_flow, positive_ma) = state.positive_flow.next(positive);
    let (negative_flow, negative_ma) = state.negative_flow.next(negative);

    let ratio = if negative_ma <= 0.0 {
        MAX_FLOW_RATIO
    } else {
        positive_ma / negative_ma
    };
    let mfi = 100.0 - 100.0 / (1.0 + ratio);
    let mfi_delta = mfi - state.prev_mfi.unwrap_or(mfi);

    (
        MfiState {
            prev_typical_price: Some(typical),
            prev_mfi: Some(mfi),
            positive_flow,
            negative_flow,
        },
        MfiOutput { mfi, mfi_delta },
    )
}
