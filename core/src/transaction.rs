//! Pure transaction planners.
//!
//! Each planner looks at one [`LedgerSnapshot`] and either rejects the request
//! with a semantic [`BookingError`] or returns a [`Plan`]: the write set to
//! commit, the notices to send once it has committed, and the value handed back
//! to the caller. Planners perform no I/O, so the same snapshot always yields
//! the same plan. The runtime's retry loop re-reads and re-plans on conflict.

use crate::booking::{Booking, Guest, spots_for};
use crate::error::BookingError;
use crate::event::{Event, EventPatch};
use crate::ids::{Caller, EventId, UserId};
use crate::ledger::{LedgerOp, LedgerSnapshot, Precondition, WriteSet};
use crate::notification::BookingNotice;
use chrono::{DateTime, Utc};
use smallvec::smallvec;

/// Outcome of planning a transaction against a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plan<T> {
    /// What to commit
    pub write_set: WriteSet,
    /// What to send after the commit succeeded
    pub notices: Vec<BookingNotice>,
    /// What the caller gets back
    pub output: T,
}

/// A validate-then-produce-writeset step run inside the engine's retry loop.
pub trait LedgerTransaction: Send + Sync {
    /// Value returned to the caller on success.
    type Output: Send;

    /// Label used in logs and metrics.
    const NAME: &'static str;

    /// Event the transaction targets.
    fn event_id(&self) -> EventId;

    /// User whose booking must be part of the snapshot.
    fn subject(&self) -> &UserId;

    /// Validate against `snapshot` and describe the write.
    ///
    /// # Errors
    ///
    /// Returns the first semantic rejection that applies; nothing is written.
    fn plan(
        &self,
        snapshot: &LedgerSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Plan<Self::Output>, BookingError>;
}

// ============================================================================
// Join
// ============================================================================

/// Reserve `1 + guests` spots for the caller.
#[derive(Clone, Debug)]
pub struct JoinTransaction {
    event_id: EventId,
    caller: Caller,
    guests: Vec<Guest>,
}

impl JoinTransaction {
    /// Creates a join request.
    #[must_use]
    pub const fn new(event_id: EventId, caller: Caller, guests: Vec<Guest>) -> Self {
        Self {
            event_id,
            caller,
            guests,
        }
    }
}

impl LedgerTransaction for JoinTransaction {
    type Output = Booking;

    const NAME: &'static str = "join";

    fn event_id(&self) -> EventId {
        self.event_id
    }

    fn subject(&self) -> &UserId {
        &self.caller.user_id
    }

    fn plan(&self, snapshot: &LedgerSnapshot, now: DateTime<Utc>) -> Result<Plan<Booking>, BookingError> {
        let event = &snapshot.event.value;
        let user_id = &self.caller.user_id;

        // Legacy attendees appear only in the participant set but still hold a spot.
        if snapshot.booking.is_some() || event.is_participant(user_id) {
            return Err(BookingError::AlreadyBooked {
                event_id: event.id,
                user_id: user_id.clone(),
            });
        }

        let requested = spots_for(self.guests.len());
        let limit = event.ticket_limit();
        if requested > limit {
            return Err(BookingError::TicketLimitExceeded { limit, requested });
        }

        let capacity = event.capacity.value();
        if u64::from(event.occupancy) + u64::from(requested) > u64::from(capacity) {
            return Err(BookingError::CapacityExceeded {
                capacity,
                occupancy: event.occupancy,
                requested,
            });
        }

        let booking = Booking::new(event.id, user_id.clone(), self.guests.clone(), now);
        let write_set = WriteSet::new(
            Precondition::EventAt(snapshot.version()),
            smallvec![
                LedgerOp::PutBooking(booking.clone()),
                LedgerOp::AdjustOccupancy(i64::from(requested)),
                LedgerOp::AddParticipant(user_id.clone()),
            ],
        );

        let mut notices = Vec::new();
        if !event.is_host(user_id) {
            notices.push(BookingNotice::joined(
                event.host_id.clone(),
                &self.caller.display_name,
                &event.title,
                booking.guest_count,
                event.id,
            ));
        }

        Ok(Plan {
            write_set,
            notices,
            output: booking,
        })
    }
}

// ============================================================================
// Release
// ============================================================================

/// Who initiated a release.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseMode {
    /// The attendee leaves on their own; subject to the cancellation policy.
    SelfService,
    /// The host removes an attendee.
    HostRemoval,
}

/// What a committed release freed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// Spots returned to the event
    pub spots_freed: u32,
    /// The booking that was deleted; `None` for legacy attendees without one
    pub booking: Option<Booking>,
}

/// Free a user's reservation.
///
/// A booking frees its `total_spots`. A legacy attendee listed in the
/// participant set without a booking frees exactly one spot. A user with
/// neither gets [`BookingError::BookingNotFound`] instead of a default release
/// of one spot, since no spot is held for them and occupancy must stay equal to
/// the spots actually booked.
#[derive(Clone, Debug)]
pub struct ReleaseTransaction {
    event_id: EventId,
    actor: Caller,
    target: UserId,
    mode: ReleaseMode,
}

impl ReleaseTransaction {
    /// The caller releases their own booking.
    #[must_use]
    pub fn leave(event_id: EventId, caller: Caller) -> Self {
        let target = caller.user_id.clone();
        Self {
            event_id,
            actor: caller,
            target,
            mode: ReleaseMode::SelfService,
        }
    }

    /// The host removes `participant`.
    #[must_use]
    pub const fn remove(event_id: EventId, host: Caller, participant: UserId) -> Self {
        Self {
            event_id,
            actor: host,
            target: participant,
            mode: ReleaseMode::HostRemoval,
        }
    }

    /// Who initiated the release.
    #[must_use]
    pub const fn mode(&self) -> ReleaseMode {
        self.mode
    }

    fn notices(&self, event: &Event) -> Vec<BookingNotice> {
        match self.mode {
            ReleaseMode::SelfService if !event.is_host(&self.target) => vec![BookingNotice::left(
                event.host_id.clone(),
                &self.actor.display_name,
                &event.title,
                event.id,
            )],
            ReleaseMode::HostRemoval if !event.is_host(&self.target) => {
                vec![BookingNotice::removed_by_host(
                    self.target.clone(),
                    &event.title,
                    event.id,
                )]
            }
            ReleaseMode::SelfService | ReleaseMode::HostRemoval => Vec::new(),
        }
    }
}

impl LedgerTransaction for ReleaseTransaction {
    type Output = ReleaseOutcome;

    const NAME: &'static str = "release";

    fn event_id(&self) -> EventId {
        self.event_id
    }

    fn subject(&self) -> &UserId {
        &self.target
    }

    fn plan(
        &self,
        snapshot: &LedgerSnapshot,
        _now: DateTime<Utc>,
    ) -> Result<Plan<ReleaseOutcome>, BookingError> {
        let event = &snapshot.event.value;

        if self.mode == ReleaseMode::HostRemoval && !event.is_host(&self.actor.user_id) {
            return Err(BookingError::Unauthorized {
                action: "remove participants",
            });
        }

        // The precondition pins the booking that was read rather than the event
        // version: concurrent leaves by different users do not conflict, and the
        // decrement itself is an atomic adjustment in the store. A stale release
        // (same booking already released, or replaced by a rejoin) fails its
        // precondition and re-plans.
        let (precondition, spots_freed, mut ops) = match &snapshot.booking {
            Some(booking) => (
                Precondition::booking_held(booking),
                booking.total_spots,
                smallvec![LedgerOp::DeleteBooking(self.target.clone())],
            ),
            None if event.is_participant(&self.target) => (
                Precondition::ParticipantListed(self.target.clone()),
                1,
                smallvec![],
            ),
            None => {
                return Err(BookingError::BookingNotFound {
                    event_id: event.id,
                    user_id: self.target.clone(),
                });
            }
        };

        if self.mode == ReleaseMode::SelfService && !event.allow_cancellation {
            return Err(BookingError::CancellationNotAllowed(event.id));
        }

        ops.push(LedgerOp::AdjustOccupancy(-i64::from(spots_freed)));
        ops.push(LedgerOp::RemoveParticipant(self.target.clone()));

        Ok(Plan {
            write_set: WriteSet::new(precondition, ops),
            notices: self.notices(event),
            output: ReleaseOutcome {
                spots_freed,
                booking: snapshot.booking.clone(),
            },
        })
    }
}

// ============================================================================
// Update
// ============================================================================

/// Host edit of an event, including capacity changes.
#[derive(Clone, Debug)]
pub struct UpdateEventTransaction {
    event_id: EventId,
    caller: Caller,
    patch: EventPatch,
}

impl UpdateEventTransaction {
    /// Creates an update request.
    #[must_use]
    pub const fn new(event_id: EventId, caller: Caller, patch: EventPatch) -> Self {
        Self {
            event_id,
            caller,
            patch,
        }
    }

    fn validate(&self, event: &Event) -> Result<(), BookingError> {
        if let Some(capacity) = self.patch.capacity {
            if capacity < event.occupancy {
                return Err(BookingError::CapacityBelowOccupancy {
                    occupancy: event.occupancy,
                    requested: capacity,
                });
            }
            if capacity == 0 {
                return Err(BookingError::InvalidEvent(
                    "capacity must be at least 1".to_string(),
                ));
            }
        }
        if self.patch.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
            return Err(BookingError::InvalidEvent("title is required".to_string()));
        }
        if self.patch.max_tickets_per_user == Some(0) {
            return Err(BookingError::InvalidEvent(
                "max tickets per user must be at least 1".to_string(),
            ));
        }
        if self.patch.is_empty() {
            return Err(BookingError::InvalidEvent("update changes nothing".to_string()));
        }
        Ok(())
    }
}

impl LedgerTransaction for UpdateEventTransaction {
    type Output = Event;

    const NAME: &'static str = "update";

    fn event_id(&self) -> EventId {
        self.event_id
    }

    fn subject(&self) -> &UserId {
        &self.caller.user_id
    }

    fn plan(&self, snapshot: &LedgerSnapshot, _now: DateTime<Utc>) -> Result<Plan<Event>, BookingError> {
        let event = &snapshot.event.value;

        if !event.is_host(&self.caller.user_id) {
            return Err(BookingError::Unauthorized {
                action: "update the event",
            });
        }
        self.validate(event)?;

        let mut updated = event.clone();
        updated.apply_patch(&self.patch);

        Ok(Plan {
            // Pinning the version makes a concurrent join force a re-check of
            // the capacity against the new occupancy.
            write_set: WriteSet::new(
                Precondition::EventAt(snapshot.version()),
                smallvec![LedgerOp::ApplyPatch(self.patch.clone())],
            ),
            notices: Vec::new(),
            output: updated,
        })
    }
}
