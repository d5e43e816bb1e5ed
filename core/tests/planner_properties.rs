//! Property tests: planners applied in sequence never break the ledger invariants.
//!
//! A tiny pure ledger (one event plus a booking map) stands in for the store.
//! Each generated step is planned against the current state and, when accepted,
//! applied exactly like a store would apply the write set.

#![allow(clippy::unwrap_used)]

use attendance_core::{
    Booking, BookingError, Caller, Event, EventDraft, EventId, EventPatch, Guest, JoinTransaction,
    LedgerOp, LedgerSnapshot, LedgerTransaction, ReleaseTransaction, UpdateEventTransaction,
    UserId, Version, Versioned,
};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Clone, Debug)]
enum Step {
    Join { user: u8, guests: u8 },
    Leave { user: u8 },
    Resize { capacity: u32 },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0u8..8, 0u8..5).prop_map(|(user, guests)| Step::Join { user, guests }),
        3 => (0u8..8).prop_map(|user| Step::Leave { user }),
        1 => (0u32..16).prop_map(|capacity| Step::Resize { capacity }),
    ]
}

struct Ledger {
    event: Event,
    version: Version,
    bookings: HashMap<UserId, Booking>,
}

impl Ledger {
    fn new(capacity: u32) -> Self {
        let event = EventDraft::new("Property night", capacity).into_event(
            EventId::new(),
            UserId::new("host"),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        );
        Self {
            event,
            version: Version::INITIAL,
            bookings: HashMap::new(),
        }
    }

    fn snapshot(&self, user: &UserId) -> LedgerSnapshot {
        LedgerSnapshot::new(
            Versioned::new(self.event.clone(), self.version),
            self.bookings.get(user).cloned(),
        )
    }

    fn run<T: LedgerTransaction>(&mut self, tx: &T) -> Result<T::Output, BookingError> {
        let plan = tx.plan(&self.snapshot(tx.subject()), Utc::now())?;
        for op in &plan.write_set.ops {
            match op {
                LedgerOp::PutBooking(booking) => {
                    assert!(self.bookings.insert(booking.user_id.clone(), booking.clone()).is_none());
                }
                LedgerOp::DeleteBooking(user) => {
                    self.bookings.remove(user);
                }
                other => other.apply_to_event(&mut self.event),
            }
        }
        self.version = self.version.next();
        Ok(plan.output)
    }

    fn booked_spots(&self) -> u32 {
        self.bookings.values().map(|b| b.total_spots).sum()
    }
}

fn caller(user: u8) -> Caller {
    Caller::new(format!("user-{user}"), format!("User {user}"))
}

proptest! {
    #[test]
    fn occupancy_matches_bookings_and_never_exceeds_capacity(
        capacity in 1u32..12,
        steps in prop::collection::vec(step(), 1..60),
    ) {
        let mut ledger = Ledger::new(capacity);
        let host = Caller::new("host", "Hana");

        for step in steps {
            let before = ledger.event.clone();
            let result = match step {
                Step::Join { user, guests } => {
                    let guests = (0..guests).map(|g| Guest::named(format!("g{g}"))).collect();
                    ledger
                        .run(&JoinTransaction::new(ledger.event.id, caller(user), guests))
                        .map(|_| ())
                }
                Step::Leave { user } => ledger
                    .run(&ReleaseTransaction::leave(ledger.event.id, caller(user)))
                    .map(|_| ()),
                Step::Resize { capacity } => ledger
                    .run(&UpdateEventTransaction::new(
                        ledger.event.id,
                        host.clone(),
                        EventPatch::capacity(capacity),
                    ))
                    .map(|_| ()),
            };

            if result.is_err() {
                prop_assert_eq!(&ledger.event, &before, "a rejected step must not write");
            }
            prop_assert_eq!(ledger.event.occupancy, ledger.booked_spots());
            prop_assert!(ledger.event.occupancy <= ledger.event.capacity.value());
            prop_assert_eq!(ledger.event.participants.len(), ledger.bookings.len());
        }
    }

    #[test]
    fn join_then_leave_restores_occupancy(
        prior in 0u32..5,
        guests in 0u8..4,
    ) {
        let mut ledger = Ledger::new(20);
        for user in 0..prior {
            let user = u8::try_from(user).unwrap() + 100;
            ledger.run(&JoinTransaction::new(ledger.event.id, caller(user), Vec::new())).unwrap();
        }
        let start = ledger.event.occupancy;

        let guests = (0..guests).map(|g| Guest::named(format!("g{g}"))).collect();
        ledger.run(&JoinTransaction::new(ledger.event.id, caller(1), guests)).unwrap();
        let outcome = ledger.run(&ReleaseTransaction::leave(ledger.event.id, caller(1))).unwrap();

        prop_assert_eq!(ledger.event.occupancy, start);
        prop_assert!(outcome.booking.is_some());
        prop_assert!(!ledger.bookings.contains_key(&caller(1).user_id));
    }
}
