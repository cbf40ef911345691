//! End-to-end pipeline tests: ingestion, indicators, rules, deduplication and delivery.

use barwatch::core::runtime::{PipelineOutputs, RuntimeConfig, SignalRuntime};
use barwatch::metrics::Metrics;
use barwatch::models::{Action, Decision};
use barwatch::notifications::{JsonFileStore, MemoryStore, NotificationStore, Notifier, NotifierConfig};
use barwatch::services::features::write_features;
use barwatch::services::ingest::read_bars;
use barwatch::services::sink::{DeliverySink, RecordingSink, RetryingSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn notifier_config(recipients: &[&str]) -> NotifierConfig {
    NotifierConfig {
        recipients: recipients.iter().map(|r| r.to_string()).collect(),
        rule_filter: Vec::new(),
        batch_size: 4,
        batch_timeout: Duration::from_millis(20),
        flush_interval: Duration::from_secs(60),
    }
}

fn decision(ticker: &str, rule: &str, action: Action) -> Decision {
    Decision {
        ticker: ticker.to_string(),
        rule: rule.to_string(),
        action,
        explanation: format!("{} says {}", rule, action),
    }
}

/// Feeds `input` (JSON lines) through the whole pipeline and returns the delivered alerts.
async fn run_lines<S>(input: &str, store: Arc<S>, sink: Arc<RecordingSink>, config: NotifierConfig) -> Arc<Metrics>
where
    S: NotificationStore + 'static,
{
    let metrics = Arc::new(Metrics::new().unwrap());
    let (bar_tx, bar_rx) = mpsc::channel(16);
    let (decision_tx, decision_rx) = mpsc::channel(16);

    let notifier_task = Notifier::new(config, store, sink, metrics.clone()).spawn(decision_rx);
    let runtime_task = SignalRuntime::new(RuntimeConfig::default(), metrics.clone()).spawn(
        bar_rx,
        PipelineOutputs {
            decisions: decision_tx,
            features: None,
        },
    );

    read_bars(input.as_bytes(), bar_tx, metrics.clone()).await;
    runtime_task.await.unwrap();
    notifier_task.await.unwrap();
    metrics
}

const THREE_BARS: &str = r#"{"symbol":"AAA","date":"2024-01-01","open":10,"high":10,"low":9,"close":9.5,"volume":1000,"dividends":0}
{"symbol":"AAA","date":"2024-01-02","open":9.5,"high":10.5,"low":9.8,"close":10.2,"volume":1200,"dividends":0}
not a bar
{"symbol":"AAA","date":"2024-01-03","open":10.2,"high":11,"low":10,"close":10.8,"volume":900,"dividends":0}
"#;

#[tokio::test]
async fn repeated_actions_are_delivered_once() {
    let sink = Arc::new(RecordingSink::new());
    let store = Arc::new(MemoryStore::new());
    let metrics = run_lines(THREE_BARS, store.clone(), sink.clone(), notifier_config(&["42"])).await;

    // MACD goes SELL -> BUY -> BUY, every other rule keeps its first action:
    // six first alerts plus the MACD flip.
    let deliveries = sink.deliveries().await;
    assert_eq!(deliveries.len(), 7);
    assert!(deliveries.iter().all(|(recipient, _)| recipient == "42"));
    assert_eq!(metrics.bars_rejected_total.get(), 1);
    assert_eq!(metrics.decisions_total.get(), 18);
    assert_eq!(metrics.notifications_sent_total.get(), 7);
    assert_eq!(metrics.notifications_suppressed_total.get(), 11);

    let state = store.snapshot().await;
    assert_eq!(state["42"]["AAA"].len(), 6);
    assert_eq!(state["42"]["AAA"]["MACD"], Action::Buy);
    assert_eq!(state["42"]["AAA"]["RSI"], Action::Sell);
    assert_eq!(state["42"]["AAA"]["Coppock Curve"], Action::Buy);
}

#[tokio::test]
async fn replaying_input_only_sends_transitions() {
    let store = Arc::new(MemoryStore::new());
    run_lines(THREE_BARS, store.clone(), Arc::new(RecordingSink::new()), notifier_config(&["42"])).await;

    // A fresh pipeline starts cold: MACD is SELL again on the first bar, then BUY.
    let second = Arc::new(RecordingSink::new());
    run_lines(THREE_BARS, store.clone(), second.clone(), notifier_config(&["42"])).await;

    let resent = second.deliveries().await;
    assert_eq!(resent.len(), 2);
    assert!(resent[0].1.starts_with("*SELL* AAA"));
    assert!(resent[1].1.starts_with("*BUY* AAA"));
    assert!(resent.iter().all(|(_, text)| text.contains("Rule: _MACD_")));
}

#[tokio::test]
async fn same_decision_twice_yields_one_delivery() {
    let sink = Arc::new(RecordingSink::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let (tx, rx) = mpsc::channel(8);
    let task = Notifier::new(notifier_config(&["7"]), Arc::new(MemoryStore::new()), sink.clone(), metrics.clone())
        .spawn(rx);

    tx.send(decision("AAA", "MACD", Action::Buy)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    tx.send(decision("AAA", "MACD", Action::Buy)).await.unwrap();
    drop(tx);
    task.await.unwrap();

    assert_eq!(sink.deliveries().await.len(), 1);
    assert_eq!(metrics.notifications_suppressed_total.get(), 1);
}

#[tokio::test]
async fn failed_delivery_is_retried_on_next_decision() {
    let sink = Arc::new(RecordingSink::new());
    sink.fail_next(1);
    let store = Arc::new(MemoryStore::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let (tx, rx) = mpsc::channel(8);
    let task = Notifier::new(notifier_config(&["7"]), store.clone(), sink.clone(), metrics.clone()).spawn(rx);

    tx.send(decision("AAA", "RSI", Action::Sell)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(store.get("7", "AAA", "RSI").await, None);

    tx.send(decision("AAA", "RSI", Action::Sell)).await.unwrap();
    drop(tx);
    task.await.unwrap();

    assert_eq!(sink.attempts(), 2);
    assert_eq!(sink.deliveries().await.len(), 1);
    assert_eq!(metrics.notifications_failed_total.get(), 1);
    assert_eq!(store.get("7", "AAA", "RSI").await, Some(Action::Sell));
}

fn notifier_with(
    store: Arc<MemoryStore>,
    sink: Arc<RecordingSink>,
    config: NotifierConfig,
) -> (Notifier<MemoryStore>, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new().unwrap());
    (Notifier::new(config, store, sink, metrics.clone()), metrics)
}

async fn wait_for_deliveries(sink: &RecordingSink, count: usize) -> Vec<(String, String)> {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let deliveries = sink.deliveries().await;
            if deliveries.len() >= count {
                return deliveries;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("deliveries did not arrive in time")
}

#[tokio::test]
async fn transitions_within_one_batch_are_all_delivered() {
    let store = Arc::new(MemoryStore::new());
    store.put("alice", "AAA", "MACD", Action::Buy).await;
    let sink = Arc::new(RecordingSink::new());
    let (notifier, metrics) = notifier_with(store.clone(), sink.clone(), notifier_config(&["alice"]));

    notifier
        .deliver(vec![
            decision("AAA", "MACD", Action::Sell),
            decision("AAA", "MACD", Action::Buy),
        ])
        .await;

    let deliveries = sink.deliveries().await;
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries[0].1.starts_with("*SELL* AAA"));
    assert!(deliveries[1].1.starts_with("*BUY* AAA"));
    assert_eq!(store.get("alice", "AAA", "MACD").await, Some(Action::Buy));
    assert_eq!(metrics.notifications_sent_total.get(), 2);
}

#[tokio::test]
async fn repeats_within_one_batch_are_suppressed() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::new());
    let (notifier, metrics) = notifier_with(store.clone(), sink.clone(), notifier_config(&["alice"]));

    notifier
        .deliver(vec![
            decision("AAA", "RSI", Action::Buy),
            decision("AAA", "RSI", Action::Buy),
            decision("AAA", "RSI", Action::Sell),
            decision("AAA", "RSI", Action::Buy),
        ])
        .await;

    let actions: Vec<String> = sink
        .deliveries()
        .await
        .into_iter()
        .map(|(_, text)| text.split(' ').next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(actions, vec!["*BUY*", "*SELL*", "*BUY*"]);
    assert_eq!(metrics.notifications_suppressed_total.get(), 1);
}

#[tokio::test]
async fn overlapping_deliveries_send_once() {
    let sink = Arc::new(RecordingSink::with_latency(Duration::from_millis(50)));
    let (notifier, metrics) = notifier_with(Arc::new(MemoryStore::new()), sink.clone(), notifier_config(&["alice"]));
    let buy = decision("AAA", "MACD", Action::Buy);

    tokio::join!(notifier.deliver(vec![buy.clone()]), notifier.deliver(vec![buy]));

    assert_eq!(sink.deliveries().await.len(), 1);
    assert_eq!(metrics.notifications_suppressed_total.get(), 1);
    assert_eq!(notifier.deduplicator().in_flight().await, 0);
}

#[tokio::test]
async fn partial_batch_is_sent_after_timeout() {
    let sink = Arc::new(RecordingSink::new());
    let config = NotifierConfig {
        batch_size: 100,
        batch_timeout: Duration::from_millis(30),
        ..notifier_config(&["alice"])
    };
    let (notifier, _) = notifier_with(Arc::new(MemoryStore::new()), sink.clone(), config);
    let (tx, rx) = mpsc::channel(8);
    let task = notifier.spawn(rx);

    tx.send(decision("AAA", "MACD", Action::Buy)).await.unwrap();
    // The channel stays open, so only the timeout can release the batch.
    let deliveries = wait_for_deliveries(&sink, 1).await;
    assert_eq!(deliveries.len(), 1);

    drop(tx);
    task.await.unwrap();
}

#[tokio::test]
async fn full_batch_is_sent_without_waiting_for_timeout() {
    let sink = Arc::new(RecordingSink::new());
    let config = NotifierConfig {
        batch_size: 2,
        batch_timeout: Duration::from_secs(3600),
        ..notifier_config(&["alice"])
    };
    let (notifier, _) = notifier_with(Arc::new(MemoryStore::new()), sink.clone(), config);
    let (tx, rx) = mpsc::channel(8);
    let task = notifier.spawn(rx);

    tx.send(decision("AAA", "MACD", Action::Buy)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.deliveries().await.is_empty());

    tx.send(decision("AAA", "RSI", Action::Sell)).await.unwrap();
    let deliveries = wait_for_deliveries(&sink, 2).await;
    assert_eq!(deliveries.len(), 2);

    drop(tx);
    task.await.unwrap();
}

#[tokio::test]
async fn retrying_sink_recovers_from_transient_failures() {
    let sink = RetryingSink::new(RecordingSink::new(), 3).with_min_delay(Duration::from_millis(1));
    sink.inner().fail_next(2);

    sink.send("7", "hello").await.unwrap();
    assert_eq!(sink.inner().attempts(), 3);
    assert_eq!(sink.inner().deliveries().await, vec![("7".to_string(), "hello".to_string())]);
}

#[tokio::test]
async fn retrying_sink_gives_up_after_max_retries() {
    let sink = RetryingSink::new(RecordingSink::new(), 1).with_min_delay(Duration::from_millis(1));
    sink.inner().fail_next(5);

    assert!(sink.send("7", "hello").await.is_err());
    assert_eq!(sink.inner().attempts(), 2);
}

#[tokio::test]
async fn rule_filter_limits_notifications() {
    let sink = Arc::new(RecordingSink::new());
    let config = NotifierConfig {
        rule_filter: vec!["MACD".to_string()],
        ..notifier_config(&["42"])
    };
    run_lines(THREE_BARS, Arc::new(MemoryStore::new()), sink.clone(), config).await;

    let deliveries = sink.deliveries().await;
    assert!(!deliveries.is_empty());
    assert!(deliveries.iter().all(|(_, text)| text.contains("Rule: _MACD_")));
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notification_state.json");

    let store = Arc::new(JsonFileStore::new(&path));
    let sink = Arc::new(RecordingSink::new());
    run_lines(THREE_BARS, store.clone(), sink, notifier_config(&["42"])).await;
    assert!(path.exists());

    let restarted = JsonFileStore::new(&path);
    assert_eq!(restarted.load_all().await.unwrap(), 6);
    assert_eq!(restarted.snapshot().await, store.snapshot().await);
}

#[tokio::test]
async fn feature_events_are_keyed_json_lines() {
    let (tx, rx) = mpsc::channel(8);
    let mut state = barwatch::indicators::IndicatorState::default();
    for bar in crate::common_bars::golden_bars() {
        tx.send(state.apply(&bar)).await.unwrap();
    }
    drop(tx);

    let mut out = Vec::new();
    let written = write_features(&mut out, rx).await.unwrap();
    assert_eq!(written, 3);

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["key"], "AAA");
    assert_eq!(lines[0]["value"]["symbol"], "AAA");
    assert_eq!(lines[0]["value"]["atr"], 1.0);
    assert!(lines[2]["value"].get("coppock_curve").is_some());
}
