//! Market structure: trailing close history, swing lows

pub mod history;
pub mod swing_low;
