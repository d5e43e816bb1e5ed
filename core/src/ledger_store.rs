//! Storage abstraction for the capacity ledger.
//!
//! A ledger store holds event documents (each with a [`Version`]) and the
//! booking records keyed by `(event, user)`. Its one non-trivial duty is
//! [`LedgerStore::commit`]: check a [`Precondition`](crate::ledger::Precondition)
//! and apply a [`WriteSet`] as a single atomic unit, bumping the event version.
//!
//! # Implementations
//!
//! - `PostgresLedgerStore` (in `attendance-postgres`): row locks plus version check
//! - `InMemoryLedgerStore` (in `attendance-testing`): fast, deterministic testing

use crate::booking::Booking;
use crate::error::BookingError;
use crate::event::Event;
use crate::ids::{EventId, UserId};
use crate::ledger::{LedgerSnapshot, WriteSet};
use crate::version::{Version, Versioned};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`LedgerStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during ledger store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The write set's precondition failed or a concurrent writer got there first.
    ///
    /// Nothing was written. The caller should re-read and plan again.
    #[error("Concurrent modification of event {event_id}")]
    Conflict {
        /// Contended event
        event_id: EventId,
    },

    /// The event does not exist (or was deleted mid-transaction).
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// An event with this id already exists.
    #[error("Event already exists: {0}")]
    DuplicateEvent(EventId),

    /// Database connection or query failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// True for [`StoreError::Conflict`].
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<StoreError> for BookingError {
    /// Maps store failures onto the public taxonomy without exposing store detail.
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { event_id } => Self::TransientConflict {
                event_id,
                attempts: 1,
            },
            StoreError::EventNotFound(event_id) => Self::EventNotFound(event_id),
            StoreError::DuplicateEvent(_) => Self::Unexpected("event could not be created".to_string()),
            StoreError::Database(_) | StoreError::Serialization(_) => {
                Self::Unexpected("storage is unavailable".to_string())
            }
        }
    }
}

/// Versioned document store for events and their bookings.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the engine shares one store across
/// every concurrent request.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the engine can
/// hold an `Arc<dyn LedgerStore>` and pick the backend at startup.
pub trait LedgerStore: Send + Sync {
    /// Persist a newly created event at [`Version::INITIAL`].
    ///
    /// # Errors
    ///
    /// - `DuplicateEvent`: an event with the same id exists
    /// - `Database` / `Serialization`: store failure
    fn insert_event(&self, event: Event) -> StoreFuture<'_, Version>;

    /// Load and normalize an event.
    ///
    /// Returns `Ok(None)` when the event does not exist.
    ///
    /// # Errors
    ///
    /// - `Database` / `Serialization`: store failure
    fn load_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Versioned<Event>>>;

    /// Read the event and `user_id`'s booking from one consistent view.
    ///
    /// Returns `Ok(None)` when the event does not exist.
    ///
    /// # Errors
    ///
    /// - `Database` / `Serialization`: store failure
    fn load_snapshot(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, Option<LedgerSnapshot>>;

    /// All bookings held on an event, oldest first.
    ///
    /// # Errors
    ///
    /// - `Database` / `Serialization`: store failure
    fn list_bookings(&self, event_id: EventId) -> StoreFuture<'_, Vec<Booking>>;

    /// Atomically check the precondition and apply every op, or nothing.
    ///
    /// On success the event's version is bumped by one and the new version is
    /// returned. A `PutBooking` for a key that is already taken is a conflict.
    ///
    /// # Errors
    ///
    /// - `Conflict`: precondition failed or a concurrent writer interfered
    /// - `EventNotFound`: the event no longer exists
    /// - `Database` / `Serialization`: store failure
    fn commit(&self, event_id: EventId, write_set: WriteSet) -> StoreFuture<'_, Version>;

    /// Remove an event together with all of its bookings, atomically.
    ///
    /// Returns the bookings that were removed.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`: no such event
    /// - `Database` / `Serialization`: store failure
    fn delete_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Booking>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_transient_conflict() {
        let event_id = EventId::new();
        let error = BookingError::from(StoreError::Conflict { event_id });
        assert_eq!(
            error,
            BookingError::TransientConflict {
                event_id,
                attempts: 1
            }
        );
        assert!(StoreError::Conflict { event_id }.is_conflict());
    }

    #[test]
    fn database_detail_is_not_leaked() {
        let error = BookingError::from(StoreError::Database(
            "connection refused at 10.0.0.3:5432".to_string(),
        ));
        assert!(matches!(error, BookingError::Unexpected(_)));
        assert!(!error.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn missing_event_stays_not_found() {
        let event_id = EventId::new();
        assert_eq!(
            BookingError::from(StoreError::EventNotFound(event_id)),
            BookingError::EventNotFound(event_id)
        );
    }
}
