//! Failure taxonomy of the booking engine.
//!
//! Semantic rejections are terminal and returned verbatim; retrying them cannot
//! change the outcome. [`BookingError::TransientConflict`] is what is left after
//! the engine's own bounded retries were exhausted and the caller may try again.
//! [`BookingError::Unexpected`] wraps store failures without leaking store detail.

use crate::ids::{EventId, UserId};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by booking operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// The referenced event does not exist.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// The user holds no reservation on the event.
    #[error("User {user_id} has no booking for event {event_id}")]
    BookingNotFound {
        /// Event that was looked up
        event_id: EventId,
        /// User without a booking
        user_id: UserId,
    },

    /// The user already holds a booking; leave first to change it.
    #[error("User {user_id} already joined event {event_id}")]
    AlreadyBooked {
        /// Event already booked
        event_id: EventId,
        /// User holding the booking
        user_id: UserId,
    },

    /// The booking would exceed the per-user ticket limit.
    #[error("You can book at most {limit} tickets for this event (requested {requested})")]
    TicketLimitExceeded {
        /// Limit in force for the event
        limit: u32,
        /// Spots the request needed
        requested: u32,
    },

    /// Not enough spots left.
    #[error("Event is full: {occupancy} of {capacity} spots taken, {requested} requested")]
    CapacityExceeded {
        /// Event capacity
        capacity: u32,
        /// Occupancy at the time of the attempt
        occupancy: u32,
        /// Spots the request needed
        requested: u32,
    },

    /// A capacity reduction would drop below the spots already reserved.
    #[error("Capacity cannot be set to {requested}: {occupancy} spots are already reserved")]
    CapacityBelowOccupancy {
        /// Current occupancy
        occupancy: u32,
        /// Capacity the host asked for
        requested: u32,
    },

    /// A host-only operation was attempted by someone else.
    #[error("Only the host can {action}")]
    Unauthorized {
        /// What was attempted
        action: &'static str,
    },

    /// The event does not let attendees release their own booking.
    #[error("Event {0} does not allow cancellation")]
    CancellationNotAllowed(EventId),

    /// Event input failed validation.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Concurrent writers kept winning; the caller may retry.
    #[error("Event {event_id} is busy, gave up after {attempts} attempts")]
    TransientConflict {
        /// Contended event
        event_id: EventId,
        /// Attempts made before giving up
        attempts: usize,
    },

    /// The transaction could not finish within its deadline. Nothing was written.
    #[error("Transaction did not complete within {0:?}")]
    Timeout(Duration),

    /// Store or connectivity failure. Nothing was written.
    #[error("Service error: {0}")]
    Unexpected(String),
}

impl BookingError {
    /// True only for contention, the one failure worth retrying internally.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientConflict { .. })
    }

    /// True for rejections caused by the request itself rather than the system.
    #[must_use]
    pub const fn is_semantic(&self) -> bool {
        !matches!(
            self,
            Self::TransientConflict { .. } | Self::Timeout(_) | Self::Unexpected(_)
        )
    }

    /// True when the event or booking did not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::EventNotFound(_) | Self::BookingNotFound { .. })
    }

    /// Short stable label, used for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EventNotFound(_) | Self::BookingNotFound { .. } => "not_found",
            Self::AlreadyBooked { .. } => "already_booked",
            Self::TicketLimitExceeded { .. } => "ticket_limit_exceeded",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::CapacityBelowOccupancy { .. } => "capacity_below_occupancy",
            Self::Unauthorized { .. } => "unauthorized",
            Self::CancellationNotAllowed(_) => "cancellation_not_allowed",
            Self::InvalidEvent(_) => "invalid_event",
            Self::TransientConflict { .. } => "transient_conflict",
            Self::Timeout(_) => "timeout",
            Self::Unexpected(_) => "unexpected",
        }
    }
}
