//! Durable record of the last action delivered per (user, ticker, rule).
//!
//! On disk the state is a versioned JSON document, replaced atomically on every flush:
//!
//! ```json
//! { "version": 1, "users": { "<user>": { "<ticker>": { "<rule>": "BUY" } } } }
//! ```
//!
//! The unversioned mapping (just the `users` object) is still accepted on load.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::Action;

pub const STATE_FORMAT_VERSION: u32 = 1;

/// `user -> ticker -> rule name -> last delivered action`
pub type NotificationState = BTreeMap<String, BTreeMap<String, BTreeMap<String, Action>>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("notification state I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize notification state: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn get(&self, user: &str, ticker: &str, rule: &str) -> Option<Action>;

    async fn put(&self, user: &str, ticker: &str, rule: &str, action: Action);

    /// Replaces the in-memory state with the durable copy; returns the entry count.
    async fn load_all(&self) -> Result<usize, StoreError>;

    /// Writes the in-memory state to durable storage.
    async fn flush_all(&self) -> Result<(), StoreError>;

    async fn snapshot(&self) -> NotificationState;
}

fn lookup(state: &NotificationState, user: &str, ticker: &str, rule: &str) -> Option<Action> {
    state.get(user)?.get(ticker)?.get(rule).copied()
}

fn insert(state: &mut NotificationState, user: &str, ticker: &str, rule: &str, action: Action) {
    state
        .entry(user.to_string())
        .or_default()
        .entry(ticker.to_string())
        .or_default()
        .insert(rule.to_string(), action);
}

fn count_entries(state: &NotificationState) -> usize {
    state
        .values()
        .flat_map(|tickers| tickers.values())
        .map(|rules| rules.len())
        .sum()
}

/// Volatile store, for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<NotificationState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: NotificationState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn get(&self, user: &str, ticker: &str, rule: &str) -> Option<Action> {
        lookup(&*self.state.lock().await, user, ticker, rule)
    }

    async fn put(&self, user: &str, ticker: &str, rule: &str, action: Action) {
        insert(&mut *self.state.lock().await, user, ticker, rule, action);
    }

    async fn load_all(&self) -> Result<usize, StoreError> {
        Ok(count_entries(&*self.state.lock().await))
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn snapshot(&self) -> NotificationState {
        self.state.lock().await.clone()
    }
}

#[derive(Serialize)]
struct PersistedState<'a> {
    version: u32,
    users: &'a NotificationState,
}

/// JSON file store.
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<NotificationState>,
    dirty: AtomicBool,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(NotificationState::new()),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "notification_state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Writes a temp file next to the target, then renames it over the target.
    async fn write_atomically(&self, state: &NotificationState) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(&PersistedState {
            version: STATE_FORMAT_VERSION,
            users: state,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| self.io_error(e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.io_error(e));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for JsonFileStore {
    async fn get(&self, user: &str, ticker: &str, rule: &str) -> Option<Action> {
        lookup(&*self.state.lock().await, user, ticker, rule)
    }

    async fn put(&self, user: &str, ticker: &str, rule: &str, action: Action) {
        insert(&mut *self.state.lock().await, user, ticker, rule, action);
        self.dirty.store(true, Ordering::Release);
    }

    async fn load_all(&self) -> Result<usize, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No notification state at {}, starting empty", self.path.display());
                return Ok(0);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let loaded = parse_state(&raw);
        let entries = count_entries(&loaded);
        *self.state.lock().await = loaded;
        self.dirty.store(false, Ordering::Release);

        info!(path = %self.path.display(), entries = entries, "Loaded {} notification entries", entries);
        Ok(entries)
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let snapshot = self.state.lock().await.clone();
        let result = self.write_atomically(&snapshot).await;

        match &result {
            Ok(()) => debug!(
                path = %self.path.display(),
                entries = count_entries(&snapshot),
                "Flushed notification state"
            ),
            Err(_) => self.dirty.store(true, Ordering::Release),
        }
        result
    }

    async fn snapshot(&self) -> NotificationState {
        self.state.lock().await.clone()
    }
}

/// Parses a persisted document, skipping anything that is not a
/// `user -> ticker -> rule -> action` entry.
pub fn parse_state(raw: &str) -> NotificationState {
    let mut state = NotificationState::new();

    let document: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Notification state is not valid JSON, starting empty");
            return state;
        }
    };

    let users = match document {
        Value::Object(mut root) if root.contains_key("version") && root.contains_key("users") => {
            if let Some(version) = root.get("version").and_then(Value::as_u64) {
                if version != u64::from(STATE_FORMAT_VERSION) {
                    warn!(version = version, "Unexpected notification state version {}", version);
                }
            }
            root.remove("users").unwrap_or(Value::Null)
        }
        other => other,
    };

    let Value::Object(users) = users else {
        warn!("Notification state root is not an object, starting empty");
        return state;
    };

    for (user, tickers) in users {
        let Value::Object(tickers) = tickers else {
            warn!(user = %user, "Skipping malformed notification entry for user {}", user);
            continue;
        };
        for (ticker, rules) in tickers {
            let Value::Object(rules) = rules else {
                warn!(user = %user, ticker = %ticker, "Skipping malformed notification entry for {}/{}", user, ticker);
                continue;
            };
            for (rule, action) in rules {
                match action.as_str().map(str::parse::<Action>) {
                    Some(Ok(action)) => insert(&mut state, &user, &ticker, &rule, action),
                    _ => warn!(
                        user = %user,
                        ticker = %ticker,
                        rule = %rule,
                        value = %action,
                        "Treating unparseable notification entry as unset"
                    ),
                }
            }
        }
    }

    state
}
