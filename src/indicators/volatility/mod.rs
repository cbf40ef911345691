//! Volatility indicators: ATR

pub mod atr;
