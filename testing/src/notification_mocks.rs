//! Notification sinks for tests
//!
//! - [`RecordingNotificationSink`]: keeps every notice, can wait for a count
//! - [`FailingNotificationSink`]: rejects every notice
//! - [`StalledNotificationSink`]: never completes a delivery

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use attendance_core::notification::{BookingNotice, NotificationSink, NotifyError};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

type NotifyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;

/// Sink that records every notice it receives.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotificationSink {
    notices: Arc<Mutex<Vec<BookingNotice>>>,
    arrived: Arc<Notify>,
}

impl RecordingNotificationSink {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far, in arrival order.
    #[must_use]
    pub fn notices(&self) -> Vec<BookingNotice> {
        self.notices.lock().unwrap().clone()
    }

    /// Number of notices received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.notices.lock().unwrap().len()
    }

    /// True when nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` notices arrived, or `timeout` passed.
    ///
    /// Returns whether the count was reached.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let arrived = self.arrived.notified();
                if self.len() >= count {
                    return;
                }
                arrived.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

impl NotificationSink for RecordingNotificationSink {
    fn notify(&self, notice: BookingNotice) -> NotifyFuture<'_> {
        Box::pin(async move {
            self.notices.lock().unwrap().push(notice);
            self.arrived.notify_waiters();
            Ok(())
        })
    }
}

/// Sink whose deliveries always fail.
#[derive(Clone, Debug, Default)]
pub struct FailingNotificationSink {
    attempts: Arc<AtomicUsize>,
}

impl FailingNotificationSink {
    /// Create a failing sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries attempted so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl NotificationSink for FailingNotificationSink {
    fn notify(&self, _notice: BookingNotice) -> NotifyFuture<'_> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(NotifyError::Delivery("notification service unavailable".to_string()))
        })
    }
}

/// Sink that accepts a notice and then hangs until released.
#[derive(Clone, Debug, Default)]
pub struct StalledNotificationSink {
    release: Arc<Notify>,
    entered: Arc<AtomicUsize>,
}

impl StalledNotificationSink {
    /// Create a stalled sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries that have started.
    #[must_use]
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Let every pending and future delivery finish.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

impl NotificationSink for StalledNotificationSink {
    fn notify(&self, _notice: BookingNotice) -> NotifyFuture<'_> {
        Box::pin(async move {
            self.entered.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            // Pass the permit on so later deliveries do not hang either.
            self.release.notify_one();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attendance_core::ids::{EventId, UserId};

    fn notice() -> BookingNotice {
        BookingNotice::left(UserId::new("host"), "Ana", "Chess", EventId::new())
    }

    #[tokio::test]
    async fn recorder_waits_for_arrivals() {
        let sink = RecordingNotificationSink::new();
        let background = sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            background.notify(notice()).await.unwrap();
            background.notify(notice()).await.unwrap();
        });

        assert!(sink.wait_for(2, Duration::from_secs(2)).await);
        assert_eq!(sink.len(), 2);
        assert!(!sink.wait_for(3, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn failing_sink_counts_attempts() {
        let sink = FailingNotificationSink::new();
        assert!(sink.notify(notice()).await.is_err());
        assert_eq!(sink.attempts(), 1);
    }
}
