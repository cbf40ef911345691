//! Unit tests for the symbol-partitioned runtime

use barwatch::core::runtime::{PipelineOutputs, RuntimeConfig, RuntimeReport, SignalRuntime};
use barwatch::core::windowing::WindowConfig;
use barwatch::metrics::Metrics;
use barwatch::models::{Bar, Decision, FeatureVector, Rule};
use barwatch::signals::rules::macd_rule;
use barwatch::signals::{RegisteredRule, RuleEvaluator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::common_bars::{day, flat};

struct Run {
    report: RuntimeReport,
    features: Vec<FeatureVector>,
    decisions: Vec<Decision>,
    metrics: Arc<Metrics>,
}

async fn run_pipeline(config: RuntimeConfig, bars: Vec<Bar>) -> Run {
    let metrics = Arc::new(Metrics::new().unwrap());
    let (bar_tx, bar_rx) = mpsc::channel(64);
    let (decision_tx, mut decision_rx) = mpsc::channel(1024);
    let (feature_tx, mut feature_rx) = mpsc::channel(1024);

    let runtime = SignalRuntime::new(config, metrics.clone());
    let handle = runtime.spawn(
        bar_rx,
        PipelineOutputs {
            decisions: decision_tx,
            features: Some(feature_tx),
        },
    );

    for bar in bars {
        bar_tx.send(bar).await.unwrap();
    }
    drop(bar_tx);
    let report = handle.await.unwrap();

    let mut features = Vec::new();
    while let Some(f) = feature_rx.recv().await {
        features.push(f);
    }
    let mut decisions = Vec::new();
    while let Some(d) = decision_rx.recv().await {
        decisions.push(d);
    }

    Run {
        report,
        features,
        decisions,
        metrics,
    }
}

#[test]
fn test_runtime_config_default() {
    let config = RuntimeConfig::default();
    assert!(config.window.wait.is_zero());
    assert_eq!(config.indicators.atr_period, 14);
    assert_eq!(config.channel_capacity, 1024);
}

#[tokio::test]
async fn test_symbols_are_processed_independently() {
    let bars = vec![
        flat("AAA", 0, 10.0),
        flat("BBB", 0, 50.0),
        flat("AAA", 1, 11.0),
        flat("BBB", 1, 49.0),
        flat("AAA", 2, 12.0),
    ];
    let run = run_pipeline(RuntimeConfig::default(), bars).await;

    assert_eq!(run.report.bars_processed(), 5);
    assert_eq!(run.report.symbol("AAA").unwrap().bars_processed, 3);
    assert_eq!(run.report.symbol("BBB").unwrap().bars_processed, 2);
    assert_eq!(run.decisions.len(), 5 * 6);
    assert_eq!(run.metrics.features_emitted_total.get(), 5);

    let aaa: Vec<f64> = run
        .features
        .iter()
        .filter(|f| f.symbol() == "AAA")
        .map(|f| f.close())
        .collect();
    assert_eq!(aaa, vec![10.0, 11.0, 12.0]);

    // BBB's first bar is a cold start regardless of AAA's history.
    let bbb_first = run.features.iter().find(|f| f.symbol() == "BBB").unwrap();
    assert_eq!(bbb_first.swing_low, 50.0);
    assert_eq!(bbb_first.pct_change, 0.0);
}

#[tokio::test]
async fn test_malformed_bar_is_rejected_before_engine() {
    let mut bad = flat("AAA", 1, 10.0);
    bad.close = f64::NAN;
    let run = run_pipeline(RuntimeConfig::default(), vec![flat("AAA", 0, 10.0), bad]).await;

    assert_eq!(run.report.bars_rejected, 1);
    assert_eq!(run.report.bars_processed(), 1);
    assert_eq!(run.metrics.bars_rejected_total.get(), 1);
    assert!(run.features.iter().all(|f| f.close().is_finite()));
}

#[tokio::test]
async fn test_late_bar_is_dropped() {
    let bars = vec![flat("AAA", 2, 10.0), flat("AAA", 1, 9.0), flat("AAA", 3, 11.0)];
    let run = run_pipeline(RuntimeConfig::default(), bars).await;

    assert_eq!(run.report.symbol("AAA").unwrap().bars_late, 1);
    assert_eq!(run.metrics.bars_late_total.get(), 1);
    let closes: Vec<f64> = run.features.iter().map(|f| f.close()).collect();
    assert_eq!(closes, vec![10.0, 11.0]);
}

#[tokio::test]
async fn test_buffered_windows_flush_in_order_on_shutdown() {
    let config = RuntimeConfig {
        window: WindowConfig::with_wait(Duration::from_secs(3 * 24 * 60 * 60)),
        tick: Duration::from_millis(10),
        ..RuntimeConfig::default()
    };
    let bars = vec![flat("AAA", 1, 11.0), flat("AAA", 0, 10.0), flat("AAA", 2, 12.0)];
    let run = run_pipeline(config, bars).await;

    let dates: Vec<_> = run.features.iter().map(|f| f.bar.date).collect();
    assert_eq!(dates, vec![day(0), day(1), day(2)]);
    assert_eq!(run.report.symbol("AAA").unwrap().bars_late, 0);
}

#[tokio::test]
async fn test_missing_symbol_is_keyed_unknown() {
    let run = run_pipeline(RuntimeConfig::default(), vec![flat("", 0, 10.0)]).await;
    assert!(run.report.symbol("unknown").is_some());
    assert!(run.decisions.iter().all(|d| d.ticker == "unknown"));
}

fn macd_unless_bad(features: &FeatureVector) -> Decision {
    if features.symbol() == "BAD" {
        panic!("rule blew up for BAD");
    }
    macd_rule(features)
}

static PANICS_ON_BAD: RegisteredRule = RegisteredRule {
    rule: Rule {
        name: "MACD",
        description: "MACD that fails for one ticker",
    },
    evaluate: macd_unless_bad,
};

#[tokio::test]
async fn test_panicking_symbol_does_not_affect_others() {
    let metrics = Arc::new(Metrics::new().unwrap());
    let (bar_tx, bar_rx) = mpsc::channel(64);
    let (decision_tx, mut decision_rx) = mpsc::channel(1024);
    let (feature_tx, mut feature_rx) = mpsc::channel(1024);

    let handle = SignalRuntime::new(RuntimeConfig::default(), metrics.clone())
        .with_evaluator(RuleEvaluator::with_rules([&PANICS_ON_BAD]))
        .spawn(
            bar_rx,
            PipelineOutputs {
                decisions: decision_tx,
                features: Some(feature_tx),
            },
        );

    bar_tx.send(flat("BAD", 0, 10.0)).await.unwrap();
    bar_tx.send(flat("GOOD", 0, 20.0)).await.unwrap();
    // Let BAD's task hit the panic before its later bars arrive.
    tokio::time::sleep(Duration::from_millis(50)).await;
    for n in 1..4 {
        bar_tx.send(flat("BAD", n, 10.0 + n as f64)).await.unwrap();
        bar_tx.send(flat("GOOD", n, 20.0 + n as f64)).await.unwrap();
    }
    drop(bar_tx);
    let report = handle.await.unwrap();

    assert_eq!(report.failed_symbols, vec!["BAD".to_string()]);
    assert!(report.symbol("BAD").is_none());
    assert_eq!(report.symbol("GOOD").unwrap().bars_processed, 4);

    let mut decisions = Vec::new();
    while let Some(d) = decision_rx.recv().await {
        decisions.push(d);
    }
    assert_eq!(decisions.len(), 4);
    assert!(decisions.iter().all(|d| d.ticker == "GOOD"));

    let mut features = Vec::new();
    while let Some(f) = feature_rx.recv().await {
        features.push(f);
    }
    // Only BAD's first bar got as far as the engine.
    let bad: Vec<f64> = features.iter().filter(|f| f.symbol() == "BAD").map(|f| f.close()).collect();
    assert_eq!(bad, vec![10.0]);
    let good: Vec<f64> = features.iter().filter(|f| f.symbol() == "GOOD").map(|f| f.close()).collect();
    assert_eq!(good, vec![20.0, 21.0, 22.0, 23.0]);
    assert_eq!(metrics.active_symbols.get(), 0);
}

#[tokio::test]
async fn test_stalled_symbol_does_not_block_routing() {
    let metrics = Arc::new(Metrics::new().unwrap());
    let config = RuntimeConfig {
        channel_capacity: 1,
        ..RuntimeConfig::default()
    };
    let (bar_tx, bar_rx) = mpsc::channel(1);
    // Nobody reads decisions yet, so AAA's task blocks on its first bar.
    let (decision_tx, mut decision_rx) = mpsc::channel(1);

    let handle = SignalRuntime::new(config, metrics.clone()).spawn(
        bar_rx,
        PipelineOutputs {
            decisions: decision_tx,
            features: None,
        },
    );

    let feed = async {
        for n in 0..10 {
            bar_tx.send(flat("AAA", n, 10.0)).await.unwrap();
        }
        bar_tx.send(flat("BBB", 0, 50.0)).await.unwrap();
        while metrics.active_symbols.get() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), feed)
        .await
        .expect("router kept accepting bars while AAA was stalled");
    drop(bar_tx);

    let mut decisions = Vec::new();
    while let Some(d) = decision_rx.recv().await {
        decisions.push(d);
    }
    let report = handle.await.unwrap();
    assert_eq!(report.symbol("AAA").unwrap().bars_processed, 10);
    assert_eq!(report.symbol("BBB").unwrap().bars_processed, 1);
    assert_eq!(decisions.len(), 11 * 6);
}
