//! Momentum indicators: MACD, RSI, Coppock Curve

pub mod coppock;
pub mod macd;
pub mod rsi;
