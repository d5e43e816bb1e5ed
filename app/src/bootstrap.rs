//! Assembles the store, dispatcher, engine and metrics server from [`Config`].

use crate::config::{Config, StoreBackend};
use crate::sink::TracingNotificationSink;
use attendance_core::ledger_store::{LedgerStore, StoreError};
use attendance_core::notification::NotificationSink;
use attendance_postgres::PostgresLedgerStore;
use attendance_runtime::metrics::{MetricsError, MetricsServer};
use attendance_runtime::{BookingEngine, DispatchWorker, NotificationDispatcher};
use attendance_testing::InMemoryLedgerStore;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Startup failures.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The ledger store could not be reached or migrated
    #[error("Ledger store unavailable: {0}")]
    Store(#[from] StoreError),
    /// The metrics exporter could not start
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Calling this twice is harmless.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// A running booking service.
pub struct App {
    /// Engine serving every booking operation
    pub engine: BookingEngine,
    worker: DispatchWorker,
    metrics: Option<MetricsServer>,
}

impl App {
    /// Build the app with notices written to the log.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] if the store or metrics server cannot start.
    pub async fn new(config: &Config) -> Result<Self, BootstrapError> {
        Self::with_sink(config, Arc::new(TracingNotificationSink)).await
    }

    /// Build the app delivering notices to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] if the store or metrics server cannot start.
    pub async fn with_sink(
        config: &Config,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, BootstrapError> {
        let metrics = match config.observability.metrics_addr {
            Some(addr) => {
                let mut server = MetricsServer::new(addr);
                server.start()?;
                Some(server)
            }
            None => None,
        };

        let store = build_store(config).await?;
        let (notifier, worker) = NotificationDispatcher::with_options(
            sink,
            config.notifications.queue_size,
            config.delivery_timeout(),
        );
        let engine = BookingEngine::new(store, notifier).with_policy(config.transaction_policy());

        tracing::info!(
            backend = %config.store.backend,
            max_retries = config.transactions.max_retries,
            deadline_ms = config.transactions.deadline_ms,
            "Booking engine ready"
        );

        Ok(Self {
            engine,
            worker,
            metrics,
        })
    }

    /// Current metrics in Prometheus text format, if this app installed the recorder.
    #[must_use]
    pub fn render_metrics(&self) -> Option<String> {
        self.metrics.as_ref().and_then(MetricsServer::render)
    }

    /// Stop accepting work and flush queued notices.
    ///
    /// Engine clones handed out earlier keep the notification queue open until
    /// they are dropped.
    pub async fn shutdown(self) {
        let Self { engine, worker, .. } = self;
        drop(engine);
        worker.join().await;
        tracing::info!("Booking engine stopped");
    }
}

async fn build_store(config: &Config) -> Result<Arc<dyn LedgerStore>, BootstrapError> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory ledger store; data is lost on exit");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
        StoreBackend::Postgres => {
            let store = PostgresLedgerStore::with_max_connections(
                &config.store.database_url,
                config.store.max_connections,
            )
            .await?;
            if config.store.run_migrations {
                store.migrate().await?;
            }
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use attendance_core::{Caller, EventDraft};
    use attendance_testing::RecordingNotificationSink;
    use std::time::Duration;

    fn memory_config() -> Config {
        Config::from_lookup(|_| None).unwrap()
    }

    #[tokio::test]
    async fn memory_app_runs_a_booking() {
        let sink = RecordingNotificationSink::new();
        let app = App::with_sink(&memory_config(), Arc::new(sink.clone()))
            .await
            .unwrap();

        let host = Caller::new("h", "Host");
        let event = app
            .engine
            .create_event(&host, EventDraft::new("Chess", 2))
            .await
            .unwrap();
        app.engine
            .join_event(event.id, &Caller::new("u", "Una"), vec![])
            .await
            .unwrap();

        assert!(app.render_metrics().is_none());
        app.shutdown().await;
        assert!(sink.wait_for(1, Duration::from_millis(100)).await);
    }
}
