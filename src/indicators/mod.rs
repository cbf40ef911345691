//! Incremental technical indicators.
//!
//! Every indicator is a step function `(state, bar) -> (state, output)`;
//! [`IndicatorState`] composes them into one feature vector per bar.

pub mod momentum;
pub mod state;
pub mod structure;
pub mod trend;
pub mod volatility;
pub mod volume;

pub use state::{compute, compute_series, IndicatorConfig, IndicatorState};
