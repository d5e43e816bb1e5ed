//! The booking engine: bounded optimistic transactions over a [`LedgerStore`].
//!
//! Every transactional operation follows the same loop:
//!
//! 1. read a snapshot (event + the subject's booking) at some version
//! 2. plan against it with a pure [`LedgerTransaction`]
//! 3. commit the write set, which the store applies only if its precondition
//!    still holds
//!
//! A conflicting commit sends the loop back to step 1 after a jittered backoff.
//! Semantic rejections return at once. Notices go to the dispatcher only after
//! the commit succeeded.

use crate::dispatcher::NotificationDispatcher;
use crate::metrics::BookingMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use attendance_core::booking::{Booking, Guest};
use attendance_core::environment::{Clock, SystemClock};
use attendance_core::error::BookingError;
use attendance_core::event::{Event, EventDraft, EventPatch};
use attendance_core::ids::{Caller, EventId, UserId};
use attendance_core::ledger_store::{LedgerStore, StoreError};
use attendance_core::notification::BookingNotice;
use attendance_core::transaction::{
    JoinTransaction, LedgerTransaction, ReleaseOutcome, ReleaseTransaction, UpdateEventTransaction,
};
use attendance_core::version::Version;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Retry and deadline settings for transactional operations.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPolicy {
    /// Backoff between conflicting attempts
    pub retry: RetryPolicy,
    /// Time budget for the whole operation, retries included
    pub deadline: Duration,
}

impl Default for TransactionPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            deadline: Duration::from_secs(2),
        }
    }
}

impl TransactionPolicy {
    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Result of one successful attempt.
struct Committed<T> {
    output: T,
    notices: Vec<BookingNotice>,
    occupancy_delta: i64,
}

/// Entry point for every booking operation.
///
/// Cheap to clone; clones share the store, clock and dispatcher.
#[derive(Clone)]
pub struct BookingEngine {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    notifier: NotificationDispatcher,
    policy: TransactionPolicy,
}

impl BookingEngine {
    /// Engine on `store` using the system clock and the default policy.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, notifier: NotificationDispatcher) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            notifier,
            policy: TransactionPolicy::default(),
        }
    }

    /// Use `clock` for booking and event timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use `policy` for retries and deadlines.
    #[must_use]
    pub fn with_policy(mut self, policy: TransactionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The policy in force.
    #[must_use]
    pub const fn policy(&self) -> &TransactionPolicy {
        &self.policy
    }

    // ========================================================================
    // Event lifecycle
    // ========================================================================

    /// Create an event hosted by `caller`.
    ///
    /// # Errors
    ///
    /// - `InvalidEvent`: the draft failed validation
    /// - `Unexpected`: store failure
    #[tracing::instrument(skip(self, caller, draft), fields(host_id = %caller.user_id))]
    pub async fn create_event(&self, caller: &Caller, draft: EventDraft) -> Result<Event, BookingError> {
        draft.validate()?;
        let event = draft.into_event(EventId::new(), caller.user_id.clone(), self.clock.now());

        self.store
            .insert_event(event.clone())
            .await
            .map_err(|e| store_failure(event.id, e))?;

        tracing::info!(event_id = %event.id, capacity = %event.capacity, "Event created");
        Ok(event)
    }

    /// Load an event.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`: no such event
    /// - `Unexpected`: store failure
    pub async fn get_event(&self, event_id: EventId) -> Result<Event, BookingError> {
        self.store
            .load_event(event_id)
            .await
            .map_err(|e| store_failure(event_id, e))?
            .map(|loaded| loaded.value)
            .ok_or(BookingError::EventNotFound(event_id))
    }

    /// All bookings held on an event.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`: no such event
    /// - `Unexpected`: store failure
    pub async fn list_participants(&self, event_id: EventId) -> Result<Vec<Booking>, BookingError> {
        self.get_event(event_id).await?;
        self.store
            .list_bookings(event_id)
            .await
            .map_err(|e| store_failure(event_id, e))
    }

    /// Delete an event and every booking on it. Host only.
    ///
    /// Each attendee other than the host is told the event was cancelled.
    /// Returns the bookings that were removed.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`: no such event
    /// - `Unauthorized`: caller is not the host
    /// - `Unexpected`: store failure
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn delete_event(
        &self,
        event_id: EventId,
        caller: &Caller,
    ) -> Result<Vec<Booking>, BookingError> {
        let event = self.get_event(event_id).await?;
        if !event.is_host(&caller.user_id) {
            return Err(BookingError::Unauthorized {
                action: "delete the event",
            });
        }

        let removed = self
            .store
            .delete_event(event_id)
            .await
            .map_err(|e| store_failure(event_id, e))?;

        let mut attendees: Vec<UserId> = event.participants.iter().cloned().collect();
        for booking in &removed {
            if !attendees.contains(&booking.user_id) {
                attendees.push(booking.user_id.clone());
            }
        }
        let notices = attendees
            .into_iter()
            .filter(|user_id| !event.is_host(user_id))
            .map(|user_id| BookingNotice::event_cancelled(user_id, &event.title, event_id))
            .collect();
        self.notifier.dispatch(notices);

        tracing::info!(bookings_removed = removed.len(), "Event deleted");
        Ok(removed)
    }

    // ========================================================================
    // Transactional operations
    // ========================================================================

    /// Reserve `1 + guests.len()` spots for `caller`.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`, `AlreadyBooked`, `TicketLimitExceeded`,
    ///   `CapacityExceeded`: semantic rejections, nothing written
    /// - `TransientConflict`: contention outlasted the retry budget
    /// - `Timeout`: no consistent snapshot within the deadline
    /// - `Unexpected`: store failure
    #[tracing::instrument(
        skip(self, caller, guests),
        fields(user_id = %caller.user_id, guests = guests.len())
    )]
    pub async fn join_event(
        &self,
        event_id: EventId,
        caller: &Caller,
        guests: Vec<Guest>,
    ) -> Result<Booking, BookingError> {
        self.execute(JoinTransaction::new(event_id, caller.clone(), guests))
            .await
    }

    /// Release `caller`'s own reservation.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`, `BookingNotFound`, `CancellationNotAllowed`
    /// - `TransientConflict`, `Timeout`, `Unexpected`
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn leave_event(
        &self,
        event_id: EventId,
        caller: &Caller,
    ) -> Result<ReleaseOutcome, BookingError> {
        self.execute(ReleaseTransaction::leave(event_id, caller.clone()))
            .await
    }

    /// Release `participant`'s reservation on the host's behalf.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`, `Unauthorized`, `BookingNotFound`
    /// - `TransientConflict`, `Timeout`, `Unexpected`
    #[tracing::instrument(
        skip(self, host, participant),
        fields(host_id = %host.user_id, participant = %participant)
    )]
    pub async fn remove_participant(
        &self,
        event_id: EventId,
        host: &Caller,
        participant: UserId,
    ) -> Result<ReleaseOutcome, BookingError> {
        self.execute(ReleaseTransaction::remove(event_id, host.clone(), participant))
            .await
    }

    /// Apply a host edit.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`, `Unauthorized`, `CapacityBelowOccupancy`, `InvalidEvent`
    /// - `TransientConflict`, `Timeout`, `Unexpected`
    #[tracing::instrument(skip(self, caller, patch), fields(user_id = %caller.user_id))]
    pub async fn update_event(
        &self,
        event_id: EventId,
        caller: &Caller,
        patch: EventPatch,
    ) -> Result<Event, BookingError> {
        self.execute(UpdateEventTransaction::new(event_id, caller.clone(), patch))
            .await
    }

    /// Change capacity; never below current occupancy.
    ///
    /// # Errors
    ///
    /// Same as [`BookingEngine::update_event`].
    pub async fn update_event_capacity(
        &self,
        event_id: EventId,
        caller: &Caller,
        new_capacity: u32,
    ) -> Result<Event, BookingError> {
        self.update_event(event_id, caller, EventPatch::capacity(new_capacity))
            .await
    }

    async fn execute<T: LedgerTransaction>(&self, tx: T) -> Result<T::Output, BookingError> {
        let event_id = tx.event_id();
        let started = Instant::now();
        let deadline = started + self.policy.deadline;
        let mut attempts = 0_usize;

        BookingMetrics::transaction_started();
        let result = retry_with_predicate(
            &self.policy.retry,
            || {
                attempts += 1;
                self.attempt(&tx, deadline)
            },
            BookingError::is_retryable,
        )
        .await;
        BookingMetrics::transaction_finished();
        BookingMetrics::record_retries(T::NAME, attempts.saturating_sub(1));

        let result = match result {
            Ok(committed) => {
                BookingMetrics::record_occupancy_change(committed.occupancy_delta);
                self.notifier.dispatch(committed.notices);
                Ok(committed.output)
            }
            Err(BookingError::TransientConflict { .. }) => {
                tracing::warn!(attempts, "Gave up on contended event");
                Err(BookingError::TransientConflict { event_id, attempts })
            }
            Err(error) => Err(error),
        };

        let outcome = result.as_ref().map_or_else(BookingError::kind, |_| "committed");
        BookingMetrics::record_transaction(T::NAME, outcome, started.elapsed());
        result
    }

    async fn attempt<T: LedgerTransaction>(
        &self,
        tx: &T,
        deadline: Instant,
    ) -> Result<Committed<T::Output>, BookingError> {
        let event_id = tx.event_id();
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(BookingError::Timeout(self.policy.deadline));
        }

        let snapshot = tokio::time::timeout(
            remaining,
            self.store.load_snapshot(event_id, tx.subject().clone()),
        )
        .await
        .map_err(|_| BookingError::Timeout(self.policy.deadline))?
        .map_err(|e| store_failure(event_id, e))?
        .ok_or(BookingError::EventNotFound(event_id))?;

        let read_version = snapshot.version();
        let plan = tx.plan(&snapshot, self.clock.now()).inspect_err(|error| {
            tracing::debug!(transaction = T::NAME, error = %error, "Rejected");
        })?;
        let occupancy_delta = plan.write_set.occupancy_delta();

        let version: Version = self
            .store
            .commit(event_id, plan.write_set)
            .await
            .map_err(|e| store_failure(event_id, e))?;

        tracing::debug!(
            transaction = T::NAME,
            read_version = %read_version,
            version = %version,
            occupancy_delta,
            "Committed"
        );

        Ok(Committed {
            output: plan.output,
            notices: plan.notices,
            occupancy_delta,
        })
    }
}

/// Log store failures before they are reduced to the public taxonomy.
fn store_failure(event_id: EventId, error: StoreError) -> BookingError {
    match &error {
        StoreError::Conflict { .. } => {
            tracing::debug!(event_id = %event_id, "Write conflict");
        }
        StoreError::EventNotFound(_) => {}
        StoreError::DuplicateEvent(_) | StoreError::Database(_) | StoreError::Serialization(_) => {
            tracing::error!(event_id = %event_id, error = %error, "Ledger store failure");
        }
    }
    BookingError::from(error)
}
