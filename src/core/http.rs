//! Operational HTTP surface: liveness and Prometheus exposition.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};

use crate::metrics::Metrics;

const SERVICE_NAME: &str = "barwatch-signal-engine";

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<Metrics>,
    started: Instant,
}

impl AppState {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            started: Instant::now(),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    pub uptime_seconds: u64,
    pub active_symbols: i64,
    pub bars_received: u64,
    pub notifications_sent: u64,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    let metrics = &state.metrics;
    Json(HealthReport {
        status: "healthy",
        service: SERVICE_NAME,
        uptime_seconds: state.started.elapsed().as_secs(),
        active_symbols: metrics.active_symbols.get(),
        bars_received: metrics.bars_received_total.get(),
        notifications_sent: metrics.notifications_sent_total.get(),
    })
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.export().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let metrics = state.metrics.clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    metrics.http_requests_in_flight.inc();
    let response = next.run(request).await;
    metrics.http_requests_in_flight.dec();

    let elapsed = started.elapsed();
    metrics.http_requests_total.inc();
    metrics
        .http_request_duration_seconds
        .observe(elapsed.as_secs_f64());

    if response.status().is_server_error() {
        error!(
            path = %path,
            status = %response.status(),
            duration_ms = elapsed.as_millis() as u64,
            "Request to {} failed",
            path
        );
    }
    response
}

pub fn create_router(state: AppState) -> Router {
    let layers = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(layers)
        .with_state(state)
}

/// Serves the operational endpoints until the listener fails.
pub async fn start_server(
    port: u16,
    metrics: Arc<Metrics>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Serving /health and /metrics on {}", addr);

    axum::serve(listener, create_router(AppState::new(metrics))).await?;
    Ok(())
}
