//! Trend indicators: EMA, ADX

pub mod adx;
pub mod ema;

pub use ema::Ema;
