//! Prometheus metrics for the sale engine.
//!
//! This module provides metric collection for:
//! - Sales (sold, sold out, critical section latency)
//! - Write-behind persistence (enqueued, persisted, failed, dropped, depth)
//! - Page render refreshes
//! - Retries inside the write-behind consumer
//! - Resets
//!
//! # Example
//!
//! ```rust,no_run
//! use boxoffice_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Exposition text for a `/metrics` handler
//! let body = server.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder and renderer.
///
/// The HTTP shell serves [`MetricsServer::render`] on `GET /metrics`.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsServer")
            .field("addr", &self.addr)
            .field("handle", &self.handle.as_ref().map(|_| "PrometheusHandle"))
            .finish()
    }
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the metrics are advertised on, used for logging
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g. by another test), this logs a
    /// warning and leaves [`MetricsServer::handle`] empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1,
                    0.25, 0.5, 1.0, 2.5,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Sale Metrics
    describe_counter!("sales_completed_total", "Total number of seats sold");
    describe_counter!(
        "sales_sold_out_total",
        "Total number of sale attempts that found no seat"
    );
    describe_histogram!(
        "sale_duration_seconds",
        "Time spent inside the sale critical section"
    );
    describe_counter!("engine_resets_total", "Total number of successful resets");
    describe_counter!("engine_reset_failures_total", "Total number of failed resets");

    // Write-Behind Metrics
    describe_counter!(
        "write_behind_enqueued_total",
        "Total number of orders accepted by the write-behind queue"
    );
    describe_counter!(
        "write_behind_persisted_total",
        "Total number of orders written to the backing store"
    );
    describe_counter!(
        "write_behind_failed_total",
        "Total number of orders that exhausted retries"
    );
    describe_counter!(
        "write_behind_dropped_total",
        "Total number of orders rejected at enqueue (queue full or closed)"
    );
    describe_gauge!(
        "write_behind_queue_depth",
        "Orders waiting in the write-behind queue"
    );
    describe_histogram!(
        "write_behind_persist_duration_seconds",
        "Time taken to persist one order"
    );

    // Render Metrics
    describe_counter!(
        "render_refreshes_total",
        "Total number of completed render cache refreshes"
    );
    describe_counter!(
        "render_fallbacks_total",
        "Total number of synchronous renders on a cache miss"
    );
    describe_histogram!(
        "render_refresh_duration_seconds",
        "Time taken to render one page kind"
    );

    // Retry Metrics
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!("retry_successes_total", "Total number of successful retries");
    describe_counter!(
        "retry_exhausted_total",
        "Total number of operations that exhausted max retries"
    );
}

/// Sale metrics recorder.
pub struct SaleMetrics;

impl SaleMetrics {
    /// Record a completed sale.
    pub fn record_sold(duration: Duration) {
        counter!("sales_completed_total").increment(1);
        histogram!("sale_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a sold-out attempt.
    pub fn record_sold_out(duration: Duration) {
        counter!("sales_sold_out_total").increment(1);
        histogram!("sale_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a reset.
    pub fn record_reset(success: bool) {
        if success {
            counter!("engine_resets_total").increment(1);
        } else {
            counter!("engine_reset_failures_total").increment(1);
        }
    }
}

/// Write-behind metrics recorder.
pub struct PersistenceMetrics;

impl PersistenceMetrics {
    /// Record an accepted order.
    pub fn record_enqueued() {
        counter!("write_behind_enqueued_total").increment(1);
    }

    /// Record a persisted order.
    pub fn record_persisted(duration: Duration) {
        counter!("write_behind_persisted_total").increment(1);
        histogram!("write_behind_persist_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an order that exhausted retries.
    pub fn record_failed() {
        counter!("write_behind_failed_total").increment(1);
    }

    /// Record an order rejected at enqueue.
    pub fn record_dropped(reason: &'static str) {
        counter!("write_behind_dropped_total", "reason" => reason).increment(1);
    }

    /// Record the current queue depth.
    #[allow(clippy::cast_precision_loss)] // depth never approaches 2^52
    pub fn record_depth(depth: usize) {
        gauge!("write_behind_queue_depth").set(depth as f64);
    }
}

/// Render cache metrics recorder.
pub struct RenderMetrics;

impl RenderMetrics {
    /// Record a completed refresh of one page kind.
    pub fn record_refresh(kind: &'static str, duration: Duration) {
        counter!("render_refreshes_total", "kind" => kind).increment(1);
        histogram!("render_refresh_duration_seconds", "kind" => kind).record(duration.as_secs_f64());
    }

    /// Record a synchronous render on a cache miss.
    pub fn record_fallback(kind: &'static str) {
        counter!("render_fallbacks_total", "kind" => kind).increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn test_metrics_server_render() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start().unwrap();

        SaleMetrics::record_sold(Duration::from_micros(20));
        SaleMetrics::record_sold_out(Duration::from_micros(5));
        PersistenceMetrics::record_enqueued();
        PersistenceMetrics::record_depth(3);

        // The handle is empty when another test installed the recorder first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("sales_completed_total"));
            assert!(rendered.contains("sales_sold_out_total"));
            assert!(rendered.contains("write_behind_queue_depth"));
        }
    }

    #[test]
    fn test_recorders_without_installed_recorder() {
        // Recording is a no-op when nothing is installed; it must not panic.
        RenderMetrics::record_refresh("ticket", Duration::from_millis(1));
        RenderMetrics::record_fallback("artist");
        RetryMetrics::record_attempt();
        PersistenceMetrics::record_dropped("full");
    }
}
