//! Edges of the pipeline: ingestion, feature output and alert delivery.

pub mod features;
pub mod ingest;
pub mod sink;
pub mod telegram;

pub use ingest::{parse_bar, read_bars};
pub use sink::{DeliverySink, LogSink, RecordingSink, RetryingSink, SinkError};
pub use telegram::TelegramSink;
