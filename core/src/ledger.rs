//! Write sets: what a transaction wants the store to do, as plain values.
//!
//! Planners never touch the store. They read a [`LedgerSnapshot`], decide, and
//! hand back a [`WriteSet`]: a [`Precondition`] the store checks at commit time
//! plus the [`LedgerOp`]s to apply if it holds. The store applies all ops or none.

use crate::booking::Booking;
use crate::event::{Event, EventPatch};
use crate::ids::UserId;
use crate::version::{Version, Versioned};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Everything a planner may look at: the event and the caller's booking, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// Normalized event with the revision it was read at
    pub event: Versioned<Event>,
    /// Booking held by the user the snapshot was taken for
    pub booking: Option<Booking>,
}

impl LedgerSnapshot {
    /// Creates a snapshot.
    #[must_use]
    pub const fn new(event: Versioned<Event>, booking: Option<Booking>) -> Self {
        Self { event, booking }
    }

    /// Revision the snapshot was read at.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.event.version
    }
}

/// Condition the store verifies atomically with the write.
///
/// A failed precondition is reported as a conflict, never as a semantic error:
/// the engine re-reads and lets the planner decide again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precondition {
    /// Nothing was committed to the event since the snapshot.
    EventAt(Version),
    /// The exact booking that was read is still stored.
    ///
    /// A booking the user made after leaving has a different `created_at`, so a
    /// stale release cannot delete it or free the old spot count.
    BookingHeld {
        /// Booking owner
        user_id: UserId,
        /// Spots the release will free
        total_spots: u32,
        /// Identifies this booking among the user's successive bookings
        created_at: DateTime<Utc>,
    },
    /// The user is still in the participant set and holds no booking.
    ParticipantListed(UserId),
}

impl Precondition {
    /// Condition pinning `booking` as read.
    #[must_use]
    pub fn booking_held(booking: &Booking) -> Self {
        Self::BookingHeld {
            user_id: booking.user_id.clone(),
            total_spots: booking.total_spots,
            created_at: booking.created_at,
        }
    }

    /// Evaluates the condition against current store state.
    ///
    /// `booking` is the stored booking of [`Precondition::user`], if any.
    #[must_use]
    pub fn holds(&self, current: Version, event: &Event, booking: Option<&Booking>) -> bool {
        match self {
            Self::EventAt(expected) => *expected == current,
            Self::BookingHeld {
                total_spots,
                created_at,
                ..
            } => booking.is_some_and(|stored| {
                stored.total_spots == *total_spots && stored.created_at == *created_at
            }),
            Self::ParticipantListed(user_id) => booking.is_none() && event.is_participant(user_id),
        }
    }

    /// User whose booking the condition concerns, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&UserId> {
        match self {
            Self::EventAt(_) => None,
            Self::BookingHeld { user_id, .. } | Self::ParticipantListed(user_id) => Some(user_id),
        }
    }
}

/// A single mutation of the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerOp {
    /// Insert a booking; the key must be free.
    PutBooking(Booking),
    /// Remove the user's booking.
    DeleteBooking(UserId),
    /// Atomically add `delta` to occupancy, clamping the result at zero.
    AdjustOccupancy(i64),
    /// Add the user to the participant set.
    AddParticipant(UserId),
    /// Remove the user from the participant set.
    RemoveParticipant(UserId),
    /// Apply a host patch to the event's own fields.
    ApplyPatch(EventPatch),
}

impl LedgerOp {
    /// Applies the event-side part of this op. Booking ops leave the event untouched.
    pub fn apply_to_event(&self, event: &mut Event) {
        match self {
            Self::AdjustOccupancy(delta) => {
                event.occupancy = adjusted_occupancy(event.occupancy, *delta);
            }
            Self::AddParticipant(user_id) => {
                event.participants.insert(user_id.clone());
            }
            Self::RemoveParticipant(user_id) => {
                event.participants.remove(user_id);
            }
            Self::ApplyPatch(patch) => event.apply_patch(patch),
            Self::PutBooking(_) | Self::DeleteBooking(_) => {}
        }
    }
}

/// `occupancy + delta`, clamped to `0..=u32::MAX`.
#[must_use]
pub fn adjusted_occupancy(occupancy: u32, delta: i64) -> u32 {
    let next = i64::from(occupancy).saturating_add(delta).max(0);
    u32::try_from(next).unwrap_or(u32::MAX)
}

/// Atomic unit handed to [`LedgerStore::commit`](crate::ledger_store::LedgerStore::commit).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSet {
    /// Checked before any op is applied
    pub precondition: Precondition,
    /// Applied in order, all or none
    pub ops: SmallVec<[LedgerOp; 4]>,
}

impl WriteSet {
    /// Creates a write set.
    #[must_use]
    pub const fn new(precondition: Precondition, ops: SmallVec<[LedgerOp; 4]>) -> Self {
        Self { precondition, ops }
    }

    /// Net occupancy change of this write set.
    #[must_use]
    pub fn occupancy_delta(&self) -> i64 {
        self.ops
            .iter()
            .map(|op| match op {
                LedgerOp::AdjustOccupancy(delta) => *delta,
                _ => 0,
            })
            .sum()
    }

    /// Applies every event-side op to `event`.
    pub fn apply_to_event(&self, event: &mut Event) {
        for op in &self.ops {
            op.apply_to_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::Guest;
    use crate::event::EventDraft;
    use crate::ids::EventId;
    use chrono::Duration;
    use smallvec::smallvec;

    fn event() -> Event {
        EventDraft::new("Climbing", 10).into_event(EventId::new(), UserId::new("host"), Utc::now())
    }

    #[test]
    fn occupancy_is_clamped_at_zero() {
        assert_eq!(adjusted_occupancy(2, -5), 0);
        assert_eq!(adjusted_occupancy(2, 3), 5);
        assert_eq!(adjusted_occupancy(u32::MAX, 1), u32::MAX);
    }

    #[test]
    fn write_set_applies_event_side_ops() {
        let mut event = event();
        let user = UserId::new("u1");
        let write_set = WriteSet::new(
            Precondition::EventAt(Version::INITIAL),
            smallvec![
                LedgerOp::AdjustOccupancy(3),
                LedgerOp::AddParticipant(user.clone()),
                LedgerOp::DeleteBooking(user.clone()),
            ],
        );

        write_set.apply_to_event(&mut event);

        assert_eq!(event.occupancy, 3);
        assert!(event.is_participant(&user));
        assert_eq!(write_set.occupancy_delta(), 3);
    }

    #[test]
    fn preconditions_check_the_right_state() {
        let mut event = event();
        let user = UserId::new("u1");
        event.participants.insert(user.clone());

        assert!(Precondition::EventAt(Version::new(2)).holds(Version::new(2), &event, None));
        assert!(!Precondition::EventAt(Version::new(2)).holds(Version::new(3), &event, None));
        assert!(Precondition::ParticipantListed(user.clone()).holds(Version::new(9), &event, None));
        assert!(
            !Precondition::ParticipantListed(UserId::new("other")).holds(Version::new(9), &event, None)
        );
    }

    #[test]
    fn booking_precondition_pins_the_booking_that_was_read() {
        let event = event();
        let user = UserId::new("u1");
        let read = Booking::new(
            event.id,
            user.clone(),
            vec![Guest::named("A"), Guest::named("B")],
            Utc::now(),
        );
        let held = Precondition::booking_held(&read);

        assert!(held.holds(Version::new(9), &event, Some(&read)));
        assert!(!held.holds(Version::new(9), &event, None));

        let rejoined = Booking::new(event.id, user, vec![], read.created_at + Duration::seconds(1));
        assert!(!held.holds(Version::new(9), &event, Some(&rejoined)));
    }

    #[test]
    fn legacy_precondition_fails_once_the_user_books() {
        let mut event = event();
        let user = UserId::new("u1");
        event.participants.insert(user.clone());
        let booking = Booking::new(event.id, user.clone(), vec![], Utc::now());

        assert!(!Precondition::ParticipantListed(user).holds(Version::new(9), &event, Some(&booking)));
    }
}
