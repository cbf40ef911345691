//! Daily-bar signal engine: event-time ordering, incremental indicators, trading rules and
//! deduplicated alert delivery.

pub mod config;
pub mod core;
pub mod indicators;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod services;
pub mod signals;
