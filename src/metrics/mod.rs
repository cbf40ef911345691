//! Prometheus metrics for the pipeline and the HTTP surface.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub bars_received_total: IntCounter,
    pub bars_rejected_total: IntCounter,
    pub bars_late_total: IntCounter,
    pub features_emitted_total: IntCounter,
    pub decisions_total: IntCounter,
    pub notifications_sent_total: IntCounter,
    pub notifications_suppressed_total: IntCounter,
    pub notifications_failed_total: IntCounter,
    pub active_symbols: IntGauge,
    pub http_requests_total: IntCounter,
    pub http_requests_in_flight: IntGauge,
    pub http_request_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let bars_received_total =
            IntCounter::new("bars_received_total", "Bars accepted from the input source")?;
        let bars_rejected_total =
            IntCounter::new("bars_rejected_total", "Malformed bars rejected at ingestion")?;
        let bars_late_total =
            IntCounter::new("bars_late_total", "Bars dropped because their window had closed")?;
        let features_emitted_total =
            IntCounter::new("features_emitted_total", "Feature vectors computed")?;
        let decisions_total = IntCounter::new("decisions_total", "Rule decisions evaluated")?;
        let notifications_sent_total =
            IntCounter::new("notifications_sent_total", "Alerts delivered to the sink")?;
        let notifications_suppressed_total = IntCounter::new(
            "notifications_suppressed_total",
            "Alerts suppressed as repeats of the last delivered action",
        )?;
        let notifications_failed_total =
            IntCounter::new("notifications_failed_total", "Alerts the sink failed to deliver")?;
        let active_symbols = IntGauge::new("active_symbols", "Symbols with a running pipeline")?;
        let http_requests_total = IntCounter::new("http_requests_total", "HTTP requests served")?;
        let http_requests_in_flight =
            IntGauge::new("http_requests_in_flight", "HTTP requests currently in flight")?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
        ))?;

        registry.register(Box::new(bars_received_total.clone()))?;
        registry.register(Box::new(bars_rejected_total.clone()))?;
        registry.register(Box::new(bars_late_total.clone()))?;
        registry.register(Box::new(features_emitted_total.clone()))?;
        registry.register(Box::new(decisions_total.clone()))?;
        registry.register(Box::new(notifications_sent_total.clone()))?;
        registry.register(Box::new(notifications_suppressed_total.clone()))?;
        registry.register(Box::new(notifications_failed_total.clone()))?;
        registry.register(Box::new(active_symbols.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            bars_received_total,
            bars_rejected_total,
            bars_late_total,
            features_emitted_total,
            decisions_total,
            notifications_sent_total,
            notifications_suppressed_total,
            notifications_failed_total,
            active_symbols,
            http_requests_total,
            http_requests_in_flight,
            http_request_duration_seconds,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
