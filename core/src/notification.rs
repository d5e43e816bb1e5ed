//! Post-commit notices.
//!
//! A transaction never talks to the notification system. It produces
//! [`BookingNotice`] values, and the runtime hands them to a
//! [`NotificationSink`] only after the write set committed. Delivery is best
//! effort: a failing sink is logged, never surfaced to the caller.

use crate::ids::{EventId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// What happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Someone booked the host's event
    Joined,
    /// Someone released their booking on the host's event
    Left,
    /// The host removed the recipient from an event
    RemovedByHost,
    /// The host deleted an event the recipient had booked
    EventCancelled,
}

impl NoticeKind {
    /// Stable label as stored by the notification service.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Joined => "event_joined",
            Self::Left => "event_left",
            Self::RemovedByHost => "event_removed",
            Self::EventCancelled => "event_cancelled",
        }
    }
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value-only record of a committed booking change, addressed to one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingNotice {
    /// Who should be told
    pub recipient: UserId,
    /// What happened
    pub kind: NoticeKind,
    /// Short heading
    pub title: String,
    /// Human-readable body
    pub message: String,
    /// Event the notice is about
    pub related_event_id: EventId,
}

impl BookingNotice {
    /// Tells the host that `attendee` booked `event_title`.
    #[must_use]
    pub fn joined(
        host: UserId,
        attendee: &str,
        event_title: &str,
        guest_count: u32,
        event_id: EventId,
    ) -> Self {
        let message = match guest_count {
            0 => format!("{attendee} joined {event_title}"),
            1 => format!("{attendee} joined {event_title} (+1 guest)"),
            n => format!("{attendee} joined {event_title} (+{n} guests)"),
        };
        Self {
            recipient: host,
            kind: NoticeKind::Joined,
            title: "New Attendee".to_string(),
            message,
            related_event_id: event_id,
        }
    }

    /// Tells the host that `attendee` left `event_title`.
    #[must_use]
    pub fn left(host: UserId, attendee: &str, event_title: &str, event_id: EventId) -> Self {
        Self {
            recipient: host,
            kind: NoticeKind::Left,
            title: "Attendee Left".to_string(),
            message: format!("{attendee} left {event_title}"),
            related_event_id: event_id,
        }
    }

    /// Tells `attendee` the host removed them from `event_title`.
    #[must_use]
    pub fn removed_by_host(attendee: UserId, event_title: &str, event_id: EventId) -> Self {
        Self {
            recipient: attendee,
            kind: NoticeKind::RemovedByHost,
            title: "Removed From Event".to_string(),
            message: format!("The host removed you from {event_title}"),
            related_event_id: event_id,
        }
    }

    /// Tells `attendee` that `event_title` was deleted.
    #[must_use]
    pub fn event_cancelled(attendee: UserId, event_title: &str, event_id: EventId) -> Self {
        Self {
            recipient: attendee,
            kind: NoticeKind::EventCancelled,
            title: "Event Cancelled".to_string(),
            message: format!("{event_title} was cancelled by the host"),
            related_event_id: event_id,
        }
    }
}

/// Delivery failure reported by a sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The downstream service rejected or could not take the notice.
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    /// The sink has been shut down.
    #[error("Notification sink is closed")]
    Closed,
}

/// Outbound side of the notification system.
///
/// Implementations must be `Send + Sync`; the dispatcher calls them from a
/// background task.
pub trait NotificationSink: Send + Sync {
    /// Deliver one notice.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when delivery failed. The dispatcher logs and drops it.
    fn notify(
        &self,
        notice: BookingNotice,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}
