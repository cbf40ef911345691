//! Alert deduplication, persistence and delivery.

pub mod dedup;
pub mod format;
pub mod notifier;
pub mod store;

pub use dedup::{Deduplicator, NotificationKey};
pub use format::{escape_markdown_v2, format_decision};
pub use notifier::{Notifier, NotifierConfig};
pub use store::{JsonFileStore, MemoryStore, NotificationState, NotificationStore, StoreError};
