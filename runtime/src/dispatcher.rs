//! Fire-and-forget delivery of post-commit notices.
//!
//! The engine hands committed notices to a [`NotificationDispatcher`], which
//! only ever does a non-blocking `try_send` onto a bounded queue. A background
//! task drains the queue into the [`NotificationSink`]. Full queues, closed
//! channels, slow sinks and sink errors are logged, counted and dropped; none
//! of them can fail or delay a booking.

use crate::metrics::NotificationMetrics;
use attendance_core::notification::{BookingNotice, NotificationSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Default queue length.
pub const DEFAULT_QUEUE_SIZE: usize = 1024;

/// Default time a single delivery may take before it is abandoned.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Non-blocking handle for queueing notices. Cheap to clone.
#[derive(Clone, Debug)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<BookingNotice>,
}

/// Background task draining the queue.
#[derive(Debug)]
pub struct DispatchWorker {
    handle: JoinHandle<()>,
}

impl NotificationDispatcher {
    /// Spawn the worker with default queue size and delivery timeout.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(sink: Arc<dyn NotificationSink>) -> (Self, DispatchWorker) {
        Self::with_options(sink, DEFAULT_QUEUE_SIZE, DEFAULT_DELIVERY_TIMEOUT)
    }

    /// Spawn the worker with an explicit queue size and per-notice timeout.
    ///
    /// A `queue_size` of zero is raised to one.
    #[must_use]
    pub fn with_options(
        sink: Arc<dyn NotificationSink>,
        queue_size: usize,
        delivery_timeout: Duration,
    ) -> (Self, DispatchWorker) {
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        let handle = tokio::spawn(drain(receiver, sink, delivery_timeout));
        (Self { sender }, DispatchWorker { handle })
    }

    /// Queue notices for delivery. Never blocks and never fails.
    pub fn dispatch(&self, notices: Vec<BookingNotice>) {
        for notice in notices {
            match self.sender.try_send(notice) {
                Ok(()) => {}
                Err(TrySendError::Full(notice)) => {
                    tracing::warn!(
                        recipient = %notice.recipient,
                        kind = %notice.kind,
                        event_id = %notice.related_event_id,
                        "Notification queue full, dropping notice"
                    );
                    NotificationMetrics::record_dropped("queue_full");
                }
                Err(TrySendError::Closed(notice)) => {
                    tracing::warn!(
                        recipient = %notice.recipient,
                        kind = %notice.kind,
                        event_id = %notice.related_event_id,
                        "Notification worker stopped, dropping notice"
                    );
                    NotificationMetrics::record_dropped("closed");
                }
            }
        }
    }
}

impl DispatchWorker {
    /// Wait until every queued notice has been handled.
    ///
    /// The worker finishes once all [`NotificationDispatcher`] clones (including
    /// the ones held by engines) have been dropped.
    pub async fn join(self) {
        if let Err(error) = self.handle.await {
            tracing::error!(error = %error, "Notification worker terminated abnormally");
        }
    }

    /// Stop immediately, discarding anything still queued.
    pub fn abort(self) {
        self.handle.abort();
    }
}

async fn drain(
    mut receiver: mpsc::Receiver<BookingNotice>,
    sink: Arc<dyn NotificationSink>,
    delivery_timeout: Duration,
) {
    while let Some(notice) = receiver.recv().await {
        let recipient = notice.recipient.clone();
        let kind = notice.kind;
        match tokio::time::timeout(delivery_timeout, sink.notify(notice)).await {
            Ok(Ok(())) => {
                tracing::debug!(recipient = %recipient, kind = %kind, "Notice delivered");
                NotificationMetrics::record_dispatched();
            }
            Ok(Err(error)) => {
                tracing::warn!(
                    recipient = %recipient,
                    kind = %kind,
                    error = %error,
                    "Notification delivery failed, dropping notice"
                );
                NotificationMetrics::record_failed();
            }
            Err(_) => {
                tracing::warn!(
                    recipient = %recipient,
                    kind = %kind,
                    timeout_ms = delivery_timeout.as_millis(),
                    "Notification delivery timed out, dropping notice"
                );
                NotificationMetrics::record_dropped("timeout");
            }
        }
    }
    tracing::debug!("Notification queue closed, worker exiting");
}
