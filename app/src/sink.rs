//! Notification sink that writes notices to the log.

use attendance_core::notification::{BookingNotice, NotificationSink, NotifyError};
use std::future::Future;
use std::pin::Pin;

/// Logs every notice at `info`. Used where no notification service is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(
        &self,
        notice: BookingNotice,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(
                recipient = %notice.recipient,
                kind = %notice.kind,
                event_id = %notice.related_event_id,
                title = %notice.title,
                "{}",
                notice.message
            );
            Ok(())
        })
    }
}
