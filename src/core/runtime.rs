//! Symbol-partitioned pipeline runtime.
//!
//! A router task reads bars from the input channel and forwards each one to the task that
//! owns its symbol, spawning that task on first sight. A symbol task owns the symbol's
//! [`WindowBuffer`] and [`IndicatorState`]; it releases bars in event-time order, computes
//! features, evaluates the rules and pushes decisions downstream.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::core::windowing::{WindowBuffer, WindowConfig};
use crate::indicators::{IndicatorConfig, IndicatorState};
use crate::metrics::Metrics;
use crate::models::{Bar, Decision, FeatureVector};
use crate::signals::RuleEvaluator;

/// Configuration for the pipeline runtime
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeConfig {
    pub window: WindowConfig,
    /// How often a symbol with buffered bars re-checks its watermark.
    pub tick: Duration,
    pub indicators: IndicatorConfig,
    /// Capacity of the bounded channels feeding and draining the runtime. Per-symbol
    /// inboxes are unbounded so a stalled symbol never blocks routing for the others.
    pub channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            tick: Duration::from_secs(1),
            indicators: IndicatorConfig::default(),
            channel_capacity: 1024,
        }
    }
}

/// Where a symbol task sends its results.
#[derive(Clone)]
pub struct PipelineOutputs {
    pub decisions: mpsc::Sender<Decision>,
    pub features: Option<mpsc::Sender<FeatureVector>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolReport {
    pub symbol: String,
    pub bars_processed: u64,
    pub bars_late: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeReport {
    pub symbols: Vec<SymbolReport>,
    pub bars_rejected: u64,
    /// Symbols whose task terminated abnormally.
    pub failed_symbols: Vec<String>,
}

impl RuntimeReport {
    pub fn bars_processed(&self) -> u64 {
        self.symbols.iter().map(|s| s.bars_processed).sum()
    }

    pub fn symbol(&self, symbol: &str) -> Option<&SymbolReport> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }
}

struct SymbolHandle {
    tx: mpsc::UnboundedSender<Bar>,
    task: JoinHandle<SymbolReport>,
}

/// Routes bars to per-symbol tasks.
pub struct SignalRuntime {
    config: RuntimeConfig,
    evaluator: Arc<RuleEvaluator>,
    metrics: Arc<Metrics>,
}

impl SignalRuntime {
    pub fn new(config: RuntimeConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            evaluator: Arc::new(RuleEvaluator::new()),
            metrics,
        }
    }

    pub fn with_evaluator(mut self, evaluator: RuleEvaluator) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    pub fn spawn(
        self,
        bars: mpsc::Receiver<Bar>,
        outputs: PipelineOutputs,
    ) -> JoinHandle<RuntimeReport> {
        tokio::spawn(self.run(bars, outputs))
    }

    /// Runs until `bars` closes and every symbol task has drained its buffer.
    pub async fn run(self, mut bars: mpsc::Receiver<Bar>, outputs: PipelineOutputs) -> RuntimeReport {
        info!(
            wait_seconds = self.config.window.wait.as_secs(),
            atr_period = self.config.indicators.atr_period,
            "SignalRuntime: starting"
        );

        let mut report = RuntimeReport::default();
        let mut symbols: HashMap<String, SymbolHandle> = HashMap::new();
        let mut dead: HashSet<String> = HashSet::new();

        while let Some(bar) = bars.recv().await {
            self.metrics.bars_received_total.inc();

            if let Err(e) = bar.validate() {
                self.metrics.bars_rejected_total.inc();
                report.bars_rejected += 1;
                error!(symbol = %bar.key(), date = %bar.date, error = %e, "Rejecting malformed bar");
                continue;
            }

            let key = bar.key().to_string();
            if dead.contains(&key) {
                error!(symbol = %key, date = %bar.date, "Dropping bar for failed symbol {}", key);
                continue;
            }

            if !symbols.contains_key(&key) {
                let handle = self.spawn_symbol(&key, outputs.clone());
                symbols.insert(key.clone(), handle);
                self.metrics.active_symbols.set(symbols.len() as i64);
            }

            let delivered = match symbols.get(&key) {
                Some(handle) => handle.tx.send(bar).is_ok(),
                None => false,
            };
            if !delivered {
                // The receiver only goes away when the task has ended.
                if let Some(failed) = symbols.remove(&key) {
                    self.collect(&key, failed.task, &mut report).await;
                }
                dead.insert(key.clone());
                self.metrics.active_symbols.set(symbols.len() as i64);
                error!(symbol = %key, "Symbol task for {} is gone, dropping its bars", key);
            }
        }

        info!(symbols = symbols.len(), "SignalRuntime: input closed, draining symbols");
        let handles: Vec<(String, SymbolHandle)> = symbols.drain().collect();
        let mut tasks = Vec::with_capacity(handles.len());
        for (key, handle) in handles {
            drop(handle.tx);
            tasks.push((key, handle.task));
        }
        for (key, task) in tasks {
            self.collect(&key, task, &mut report).await;
        }
        self.metrics.active_symbols.set(0);

        report.symbols.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        info!(
            symbols = report.symbols.len(),
            bars = report.bars_processed(),
            failed = report.failed_symbols.len(),
            "SignalRuntime: stopped"
        );
        report
    }

    fn spawn_symbol(&self, key: &str, outputs: PipelineOutputs) -> SymbolHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = SymbolPipeline {
            report: SymbolReport {
                symbol: key.to_string(),
                ..SymbolReport::default()
            },
            buffer: WindowBuffer::new(self.config.window),
            state: IndicatorState::new(&self.config.indicators),
            evaluator: self.evaluator.clone(),
            outputs,
            metrics: self.metrics.clone(),
        };
        debug!(symbol = %key, "Spawning pipeline for {}", key);
        let task = tokio::spawn(pipeline.run(rx, self.config.tick));
        SymbolHandle { tx, task }
    }

    async fn collect(&self, key: &str, task: JoinHandle<SymbolReport>, report: &mut RuntimeReport) {
        match task.await {
            Ok(symbol_report) => report.symbols.push(symbol_report),
            Err(e) => {
                if e.is_panic() {
                    error!(symbol = %key, error = %e, "Symbol task for {} panicked", key);
                } else {
                    error!(symbol = %key, error = %e, "Symbol task for {} was cancelled", key);
                }
                report.failed_symbols.push(key.to_string());
            }
        }
    }
}

/// State owned by one symbol's task.
struct SymbolPipeline {
    report: SymbolReport,
    buffer: WindowBuffer,
    state: IndicatorState,
    evaluator: Arc<RuleEvaluator>,
    outputs: PipelineOutputs,
    metrics: Arc<Metrics>,
}

impl SymbolPipeline {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Bar>, tick_every: Duration) -> SymbolReport {
        let mut tick = interval(tick_every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                received = rx.recv() => {
                    let Some(bar) = received else { break };
                    match self.buffer.push(bar, Instant::now()) {
                        Ok(ready) => self.emit(ready).await,
                        Err(late) => {
                            self.metrics.bars_late_total.inc();
                            self.report.bars_late += 1;
                            warn!(
                                symbol = %late.symbol,
                                date = %late.date,
                                closed_through = %late.closed_through,
                                "Dropping late bar for {}",
                                late.symbol
                            );
                        }
                    }
                }
                _ = tick.tick(), if !self.buffer.is_empty() => {
                    let ready = self.buffer.advance(Instant::now());
                    self.emit(ready).await;
                }
            }
        }

        let remaining = self.buffer.drain();
        if !remaining.is_empty() {
            debug!(symbol = %self.report.symbol, bars = remaining.len(), "Flushing buffered windows");
        }
        self.emit(remaining).await;
        self.report
    }

    async fn emit(&mut self, bars: Vec<Bar>) {
        for bar in bars {
            let features = self.state.apply(&bar);
            self.report.bars_processed += 1;
            self.metrics.features_emitted_total.inc();

            if let Some(features_tx) = &self.outputs.features {
                if features_tx.send(features.clone()).await.is_err() {
                    warn!(symbol = %self.report.symbol, "Feature output closed, disabling it");
                    self.outputs.features = None;
                }
            }

            for decision in self.evaluator.evaluate(&features) {
                self.metrics.decisions_total.inc();
                debug!(
                    ticker = %decision.ticker,
                    rule = %decision.rule,
                    action = %decision.action,
                    date = %bar.date,
                    "{}",
                    decision.explanation
                );
                if self.outputs.decisions.send(decision).await.is_err() {
                    warn!(symbol = %self.report.symbol, "Decision channel closed");
                }
            }
        }
    }
}
