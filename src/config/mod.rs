//! Environment-driven configuration.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::runtime::RuntimeConfig;
use crate::core::windowing::WindowConfig;
use crate::indicators::IndicatorConfig;
use crate::notifications::notifier::NotifierConfig;

/// Deployment environment from `APP_ENV` (`sandbox` when unset).
pub fn get_environment() -> String {
    env::var("APP_ENV").unwrap_or_else(|_| "sandbox".to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub watermark_wait: Duration,
    pub watermark_tick: Duration,
    pub atr_period: usize,
    pub channel_capacity: usize,
    pub notification_state_path: PathBuf,
    pub state_flush_interval: Duration,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub recipients: Vec<String>,
    pub alert_rules: Vec<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_api_url: String,
    pub send_max_retries: usize,
    pub http_port: Option<u16>,
    pub features_output_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; unset or unparseable values fall back
    /// to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| -> Option<String> {
            lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        };

        Self {
            watermark_wait: Duration::from_secs(parse_or(&parsed, "WATERMARK_WAIT_SECONDS", 0)),
            watermark_tick: Duration::from_millis(
                parse_or(&parsed, "WATERMARK_TICK_MS", 1000u64).max(1),
            ),
            atr_period: parse_or(&parsed, "ATR_PERIOD", 14usize).max(1),
            channel_capacity: parse_or(&parsed, "BAR_CHANNEL_CAPACITY", 1024usize).max(1),
            notification_state_path: parsed("NOTIFICATION_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("notification_state.json")),
            state_flush_interval: Duration::from_secs(
                parse_or(&parsed, "STATE_FLUSH_INTERVAL_SECONDS", 60u64).max(1),
            ),
            batch_size: parse_or(&parsed, "NOTIFY_BATCH_SIZE", 20usize).max(1),
            batch_timeout: Duration::from_millis(parse_or(&parsed, "NOTIFY_BATCH_TIMEOUT_MS", 2000)),
            recipients: split_list(parsed("ALERT_RECIPIENTS")),
            alert_rules: split_list(parsed("ALERT_RULES")),
            telegram_bot_token: parsed("TELEGRAM_BOT_TOKEN"),
            telegram_api_url: parsed("TELEGRAM_API_URL")
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            send_max_retries: parse_or(&parsed, "SEND_MAX_RETRIES", 3usize),
            http_port: parsed("HTTP_PORT").and_then(|p| p.parse().ok()),
            features_output_path: parsed("FEATURES_OUTPUT_PATH").map(PathBuf::from),
        }
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            window: WindowConfig::with_wait(self.watermark_wait),
            tick: self.watermark_tick,
            indicators: IndicatorConfig {
                atr_period: self.atr_period,
            },
            channel_capacity: self.channel_capacity,
        }
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            recipients: self.recipients.clone(),
            rule_filter: self.alert_rules.clone(),
            batch_size: self.batch_size,
            batch_timeout: self.batch_timeout,
            flush_interval: self.state_flush_interval,
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key = key, value = %raw, "Ignoring unparseable config value for {}", key);
            default
        }),
        None => default,
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
    .unwrap_or_default()
}
