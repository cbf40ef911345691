//! Batched alert delivery.
//!
//! A single task consumes decisions, filters them through the [`Deduplicator`] for every
//! recipient and hands the survivors to the sink. A batch goes out when it reaches
//! `batch_size` decisions or when `batch_timeout` has passed since its first decision,
//! whichever comes first. The store is flushed every `flush_interval` and on shutdown.

use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::metrics::Metrics;
use crate::models::Decision;
use crate::notifications::dedup::{Deduplicator, NotificationKey};
use crate::notifications::format::format_decision;
use crate::notifications::store::NotificationStore;
use crate::services::sink::DeliverySink;

#[derive(Debug, Clone, PartialEq)]
pub struct NotifierConfig {
    pub recipients: Vec<String>,
    /// Rule names allowed to notify; empty means every rule.
    pub rule_filter: Vec<String>,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub flush_interval: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            rule_filter: Vec::new(),
            batch_size: 20,
            batch_timeout: Duration::from_millis(2000),
            flush_interval: Duration::from_secs(60),
        }
    }
}

impl NotifierConfig {
    pub fn allows(&self, rule: &str) -> bool {
        self.rule_filter.is_empty()
            || self
                .rule_filter
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(rule))
    }
}

pub struct Notifier<S: NotificationStore + ?Sized> {
    config: NotifierConfig,
    dedup: Arc<Deduplicator<S>>,
    sink: Arc<dyn DeliverySink>,
    metrics: Arc<Metrics>,
}

impl<S: NotificationStore + ?Sized + 'static> Notifier<S> {
    pub fn new(
        config: NotifierConfig,
        store: Arc<S>,
        sink: Arc<dyn DeliverySink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            dedup: Arc::new(Deduplicator::new(store)),
            sink,
            metrics,
        }
    }

    pub fn deduplicator(&self) -> Arc<Deduplicator<S>> {
        self.dedup.clone()
    }

    pub fn spawn(self, rx: mpsc::Receiver<Decision>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    /// Runs until the decision channel closes, then delivers what is queued and flushes.
    pub async fn run(self, mut rx: mpsc::Receiver<Decision>) {
        if self.config.recipients.is_empty() {
            warn!("No alert recipients configured, decisions will only be logged");
        }
        info!(
            recipients = self.config.recipients.len(),
            batch_size = self.config.batch_size,
            batch_timeout_ms = self.config.batch_timeout.as_millis() as u64,
            sink = self.sink.name(),
            "Notifier started"
        );

        let batch_size = self.config.batch_size.max(1);
        let mut batch: Vec<Decision> = Vec::with_capacity(batch_size);
        let mut deadline: Option<Instant> = None;

        let mut flush_timer = interval(self.config.flush_interval);
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        flush_timer.tick().await;

        loop {
            tokio::select! {
                received = rx.recv() => {
                    let Some(decision) = received else { break };
                    debug!(
                        ticker = %decision.ticker,
                        rule = %decision.rule,
                        action = %decision.action,
                        "Decision received"
                    );
                    if !self.config.allows(&decision.rule) {
                        continue;
                    }
                    if batch.is_empty() {
                        deadline = Some(Instant::now() + self.config.batch_timeout);
                    }
                    batch.push(decision);
                    if batch.len() >= batch_size {
                        self.deliver(std::mem::take(&mut batch)).await;
                        deadline = None;
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deliver(std::mem::take(&mut batch)).await;
                    deadline = None;
                }
                _ = flush_timer.tick() => {
                    self.persist().await;
                }
            }
        }

        if !batch.is_empty() {
            self.deliver(batch).await;
        }
        self.persist().await;
        info!("Notifier stopped");
    }

    /// Delivers one batch to every recipient.
    ///
    /// Decisions for the same (user, ticker, rule) run in arrival order, each one admitted
    /// against the outcome of the previous, so A -> B -> A within a batch sends both
    /// transitions. Distinct keys are delivered concurrently.
    pub async fn deliver(&self, batch: Vec<Decision>) {
        let mut chains: Vec<Vec<(&str, &Decision)>> = Vec::new();
        let mut slots: HashMap<NotificationKey, usize> = HashMap::new();
        for decision in &batch {
            for user in &self.config.recipients {
                let slot = *slots
                    .entry(NotificationKey::new(user, decision))
                    .or_insert_with(|| {
                        chains.push(Vec::new());
                        chains.len() - 1
                    });
                chains[slot].push((user.as_str(), decision));
            }
        }

        join_all(chains.into_iter().map(|chain| self.deliver_chain(chain))).await;
    }

    async fn deliver_chain(&self, chain: Vec<(&str, &Decision)>) {
        for (user, decision) in chain {
            if !self.dedup.admit(user, decision).await {
                self.metrics.notifications_suppressed_total.inc();
                debug!(
                    user = %user,
                    ticker = %decision.ticker,
                    rule = %decision.rule,
                    action = %decision.action,
                    "Suppressing repeated {} for {}",
                    decision.action,
                    decision.ticker
                );
                continue;
            }

            let text = format_decision(decision);
            match self.sink.send(user, &text).await {
                Ok(()) => {
                    self.dedup.commit(user, decision).await;
                    self.metrics.notifications_sent_total.inc();
                    info!(
                        user = %user,
                        ticker = %decision.ticker,
                        rule = %decision.rule,
                        action = %decision.action,
                        "Sent {} alert for {} ({})",
                        decision.action,
                        decision.ticker,
                        decision.rule
                    );
                }
                Err(e) => {
                    self.dedup.release(user, decision).await;
                    self.metrics.notifications_failed_total.inc();
                    error!(
                        user = %user,
                        ticker = %decision.ticker,
                        rule = %decision.rule,
                        error = %e,
                        "Failed to deliver alert for {}",
                        decision.ticker
                    );
                }
            }
        }
    }

    async fn persist(&self) {
        if let Err(e) = self.dedup.store().flush_all().await {
            error!(error = %e, "Failed to flush notification state");
        }
    }
}
