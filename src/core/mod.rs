//! Core application primitives (windowing, runtime, HTTP surface)

pub mod http;
pub mod runtime;
pub mod windowing;

pub use runtime::{PipelineOutputs, RuntimeConfig, RuntimeReport, SignalRuntime, SymbolReport};
pub use windowing::{LateBar, WindowBuffer, WindowConfig};
