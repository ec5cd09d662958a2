use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use spuddns_application::ports::MetricsSink;
use spuddns_domain::DomainError;
use tokio::net::TcpListener;
use tracing::{error, info};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Prometheus-backed implementation of the metrics port.
pub struct PrometheusMetrics {
    registry: Registry,
    queries_answered: IntCounter,
    queries_answered_from_cache: IntCounter,
    queries_failed: IntCounter,
    queries_predictively_refreshed: IntCounter,
    queries_resiliently_refreshed: IntCounter,
    cache_read_seconds: Histogram,
    forward_seconds: Histogram,
    response_seconds: Histogram,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Arc<Self>, DomainError> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, DomainError> {
            let counter = IntCounter::with_opts(Opts::new(name, help))
                .map_err(|e| DomainError::ConfigError(e.to_string()))?;
            registry
                .register(Box::new(counter.clone()))
                .map_err(|e| DomainError::ConfigError(e.to_string()))?;
            Ok(counter)
        };
        let histogram = |name: &str, help: &str| -> Result<Histogram, DomainError> {
            let histogram = Histogram::with_opts(HistogramOpts::new(name, help))
                .map_err(|e| DomainError::ConfigError(e.to_string()))?;
            registry
                .register(Box::new(histogram.clone()))
                .map_err(|e| DomainError::ConfigError(e.to_string()))?;
            Ok(histogram)
        };

        Ok(Arc::new(Self {
            queries_answered: counter("spuddns_queries_answered_total", "Queries answered")?,
            queries_answered_from_cache: counter(
                "spuddns_queries_answered_from_cache_total",
                "Queries answered from the cache",
            )?,
            queries_failed: counter("spuddns_queries_failed_total", "Queries that failed")?,
            queries_predictively_refreshed: counter(
                "spuddns_queries_predictively_refreshed_total",
                "Cache entries refreshed before expiry",
            )?,
            queries_resiliently_refreshed: counter(
                "spuddns_queries_resiliently_refreshed_total",
                "Stale cache entries retained after upstream failure",
            )?,
            cache_read_seconds: histogram(
                "spuddns_cache_read_seconds",
                "Cache read latency",
            )?,
            forward_seconds: histogram(
                "spuddns_forward_seconds",
                "Upstream forward latency",
            )?,
            response_seconds: histogram(
                "spuddns_response_seconds",
                "End to end response latency",
            )?,
            registry,
        }))
    }

    pub fn render(&self) -> Result<Vec<u8>, DomainError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| DomainError::ConfigError(e.to_string()))?;
        Ok(buffer)
    }
}

impl MetricsSink for PrometheusMetrics {
    fn inc_queries_answered(&self) {
        self.queries_answered.inc();
    }

    fn inc_queries_answered_from_cache(&self) {
        self.queries_answered_from_cache.inc();
    }

    fn inc_queries_failed(&self) {
        self.queries_failed.inc();
    }

    fn inc_queries_predictively_refreshed(&self) {
        self.queries_predictively_refreshed.inc();
    }

    fn inc_queries_resiliently_refreshed(&self) {
        self.queries_resiliently_refreshed.inc();
    }

    fn observe_cache_read(&self, elapsed: Duration) {
        self.cache_read_seconds.observe(elapsed.as_secs_f64());
    }

    fn observe_forward(&self, elapsed: Duration) {
        self.forward_seconds.observe(elapsed.as_secs_f64());
    }

    fn observe_response(&self, elapsed: Duration) {
        self.response_seconds.observe(elapsed.as_secs_f64());
    }
}

/// Serves the Prometheus exposition endpoint.
pub async fn run_metrics_server(
    addr: SocketAddr,
    metrics: Arc<PrometheusMetrics>,
) -> Result<(), DomainError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| DomainError::IoError(format!("failed to bind metrics listener: {e}")))?;

    info!(listener = %addr, "starting metrics server");

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| DomainError::IoError(e.to_string()))
}

async fn metrics_handler(State(metrics): State<Arc<PrometheusMetrics>>) -> Response {
    match metrics.render() {
        Ok(buffer) => {
            let mut response = buffer.into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE),
            );
            response
        }
        Err(e) => {
            error!(error = %e, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_the_exposition() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.inc_queries_answered();
        metrics.inc_queries_answered_from_cache();
        metrics.observe_response(Duration::from_millis(5));

        let rendered = String::from_utf8(metrics.render().unwrap()).unwrap();
        assert!(rendered.contains("spuddns_queries_answered_total 1"));
        assert!(rendered.contains("spuddns_queries_answered_from_cache_total 1"));
        assert!(rendered.contains("spuddns_response_seconds"));
    }
}
