//! Barwatch Worker
//!
//! Reads daily bars as JSON lines on stdin, computes indicators per symbol, evaluates the
//! trading rules and delivers deduplicated alerts.

use barwatch::config::{get_environment, PipelineConfig};
use barwatch::core::http;
use barwatch::core::runtime::{PipelineOutputs, SignalRuntime};
use barwatch::logging;
use barwatch::metrics::Metrics;
use barwatch::notifications::{JsonFileStore, NotificationStore, Notifier};
use barwatch::services::features::spawn_feature_file;
use barwatch::services::ingest::read_bars;
use barwatch::services::sink::{DeliverySink, LogSink, RetryingSink};
use barwatch::services::telegram::TelegramSink;
use dotenvy::dotenv;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env if present
    dotenv().ok();

    logging::init_logging();

    let config = PipelineConfig::from_env();
    info!("Starting Barwatch Worker");
    info!(environment = %get_environment(), "Environment");
    info!(
        wait_seconds = config.watermark_wait.as_secs(),
        recipients = config.recipients.len(),
        state_path = %config.notification_state_path.display(),
        "Pipeline configuration loaded"
    );

    let metrics = Arc::new(Metrics::new()?);

    let store = Arc::new(JsonFileStore::new(config.notification_state_path.clone()));
    if let Err(e) = store.load_all().await {
        error!(error = %e, "Failed to read notification state, starting empty");
    }

    let sink: Arc<dyn DeliverySink> = match &config.telegram_bot_token {
        Some(token) => {
            let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
            let telegram = TelegramSink::with_client(&config.telegram_api_url, token, client);
            info!(max_retries = config.send_max_retries, "Delivering alerts through Telegram");
            Arc::new(RetryingSink::new(telegram, config.send_max_retries))
        }
        None => {
            warn!("TELEGRAM_BOT_TOKEN not set, alerts will be logged only");
            Arc::new(LogSink)
        }
    };

    if let Some(port) = config.http_port {
        let http_metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = http::start_server(port, http_metrics).await {
                error!(error = %e, "HTTP server failed");
            }
        });
    }

    let runtime_config = config.runtime_config();
    let (bar_tx, bar_rx) = mpsc::channel(runtime_config.channel_capacity);
    let (decision_tx, decision_rx) = mpsc::channel(runtime_config.channel_capacity);

    let feature_tx = config.features_output_path.clone().map(|path| {
        let (tx, rx) = mpsc::channel(runtime_config.channel_capacity);
        info!(path = %path.display(), "Writing feature events to {}", path.display());
        (tx, spawn_feature_file(path, rx))
    });
    let (feature_tx, feature_task) = match feature_tx {
        Some((tx, task)) => (Some(tx), Some(task)),
        None => (None, None),
    };

    let notifier = Notifier::new(config.notifier_config(), store, sink, metrics.clone());
    let notifier_task = notifier.spawn(decision_rx);

    let runtime = SignalRuntime::new(runtime_config, metrics.clone());
    let runtime_task = runtime.spawn(
        bar_rx,
        PipelineOutputs {
            decisions: decision_tx,
            features: feature_tx,
        },
    );

    let reader_metrics = metrics.clone();
    let mut reader_task = tokio::spawn(async move {
        read_bars(BufReader::new(tokio::io::stdin()), bar_tx, reader_metrics).await
    });

    info!("Worker started, reading bars from stdin...");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down worker...");
            reader_task.abort();
        }
        finished = &mut reader_task => {
            if let Err(e) = finished {
                error!(error = %e, "Input reader failed");
            }
        }
    }

    // Dropping the bar sender lets every symbol drain its windows; the decision and
    // feature channels close once the runtime is done.
    let report = runtime_task.await?;
    info!(
        bars = report.bars_processed(),
        rejected = report.bars_rejected,
        symbols = report.symbols.len(),
        "Pipeline drained"
    );
    if !report.failed_symbols.is_empty() {
        warn!(symbols = ?report.failed_symbols, "Some symbol pipelines failed");
    }

    notifier_task.await?;
    if let Some(task) = feature_task {
        task.await?;
    }

    info!("Worker stopped");
    Ok(())
}
