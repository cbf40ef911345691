//! Shared data models spanning the engine layers.

pub mod bar;
pub mod indicators;
pub mod signal;

pub use bar::{Bar, BarError, UNKNOWN_SYMBOL};
pub use indicators::{FeatureEvent, FeatureVector};
pub use signal::{Action, Decision, Rule};
