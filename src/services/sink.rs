//! Delivery contract for rendered alerts.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected by channel (status {status}): {body}")]
    Rejected { status: u16, body: String },
}

impl SinkError {
    /// Transport failures, throttling and server errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SinkError::Transport(_) => true,
            SinkError::Rejected { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), SinkError>;

    fn name(&self) -> &'static str;
}

/// Writes alerts to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl DeliverySink for LogSink {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), SinkError> {
        info!(recipient = %recipient, text = %text, "Alert for {}", recipient);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Keeps every delivery in memory; can be told to fail upcoming sends.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(String, String)>>,
    failures_pending: AtomicUsize,
    attempts: AtomicUsize,
    latency: Duration,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send waits `latency` before completing.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// The next `count` sends fail with a transport error.
    pub fn fail_next(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    pub async fn deliveries(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failing = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SinkError::Transport("simulated failure".to_string()));
        }
        self.sent
            .lock()
            .await
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Retries retryable failures of the wrapped sink with exponential backoff.
pub struct RetryingSink<S> {
    inner: S,
    max_retries: usize,
    min_delay: Duration,
}

impl<S: DeliverySink> RetryingSink<S> {
    pub fn new(inner: S, max_retries: usize) -> Self {
        Self {
            inner,
            max_retries,
            min_delay: Duration::from_millis(500),
        }
    }

    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: DeliverySink> DeliverySink for RetryingSink<S> {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), SinkError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_times(self.max_retries);

        (|| async { self.inner.send(recipient, text).await })
            .retry(backoff)
            .when(SinkError::is_retryable)
            .notify(|err: &SinkError, delay: Duration| {
                warn!(
                    sink = self.inner.name(),
                    recipient = %recipient,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Delivery failed, retrying in {:?}",
                    delay
                );
            })
            .await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
