//! Prometheus metrics for the booking engine.
//!
//! Recorded from the engine and the notification dispatcher:
//! - Transactions by kind and outcome, with latency
//! - Conflict retries
//! - In-flight transactions
//! - Notices dispatched, dropped and failed
//!
//! # Example
//!
//! ```rust,no_run
//! use attendance_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve metrics on port 9090 (needs a running Tokio runtime)
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
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

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the HTTP listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs a
    /// warning and leaves the existing recorder in place; `render` then returns `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            // The exporter error carries no `Debug` or `Display`.
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "booking_transactions_total",
        "Booking transactions by kind and outcome"
    );
    describe_histogram!(
        "booking_transaction_duration_seconds",
        "Time from first read to commit or rejection, retries included"
    );
    describe_counter!(
        "booking_conflict_retries_total",
        "Attempts repeated because a concurrent writer won"
    );
    describe_gauge!(
        "booking_transactions_in_flight",
        "Transactions currently running"
    );
    describe_counter!(
        "booking_spots_reserved_total",
        "Spots taken by committed joins"
    );
    describe_counter!(
        "booking_spots_released_total",
        "Spots freed by committed releases"
    );

    describe_counter!(
        "notifications_dispatched_total",
        "Notices delivered to the sink"
    );
    describe_counter!(
        "notifications_dropped_total",
        "Notices dropped before delivery, by reason"
    );
    describe_counter!(
        "notifications_failed_total",
        "Notices the sink rejected"
    );
}

/// Booking transaction metrics recorder.
pub struct BookingMetrics;

impl BookingMetrics {
    /// Record a finished transaction.
    pub fn record_transaction(kind: &'static str, outcome: &'static str, duration: Duration) {
        counter!("booking_transactions_total", "kind" => kind, "outcome" => outcome).increment(1);
        histogram!("booking_transaction_duration_seconds", "kind" => kind)
            .record(duration.as_secs_f64());
    }

    /// Record conflict retries spent by one transaction.
    pub fn record_retries(kind: &'static str, retries: usize) {
        if retries > 0 {
            counter!("booking_conflict_retries_total", "kind" => kind)
                .increment(u64::try_from(retries).unwrap_or(u64::MAX));
        }
    }

    /// Mark a transaction as started.
    pub fn transaction_started() {
        gauge!("booking_transactions_in_flight").increment(1.0);
    }

    /// Mark a transaction as finished.
    pub fn transaction_finished() {
        gauge!("booking_transactions_in_flight").decrement(1.0);
    }

    /// Record spots taken (positive) or freed (negative) by a commit.
    pub fn record_occupancy_change(delta: i64) {
        if delta > 0 {
            counter!("booking_spots_reserved_total").increment(delta.unsigned_abs());
        } else if delta < 0 {
            counter!("booking_spots_released_total").increment(delta.unsigned_abs());
        }
    }
}

/// Notification metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record a delivered notice.
    pub fn record_dispatched() {
        counter!("notifications_dispatched_total").increment(1);
    }

    /// Record a notice dropped before reaching the sink.
    pub fn record_dropped(reason: &'static str) {
        counter!("notifications_dropped_total", "reason" => reason).increment(1);
    }

    /// Record a sink failure.
    pub fn record_failed() {
        counter!("notifications_failed_total").increment(1);
    }
}
