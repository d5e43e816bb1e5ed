//! # Attendance Core
//!
//! Data model and pure business logic of the booking consistency engine.
//!
//! Hosts publish events with a capacity; attendees reserve spots for themselves
//! and their guests. This crate holds everything that can be decided without
//! I/O:
//!
//! - **Ledger entities**: [`event::Event`] (capacity, occupancy, participants) and
//!   [`booking::Booking`] (one per event and user)
//! - **Normalization**: [`event::EventRecord`] is the stored shape, defaulted once
//!   on load
//! - **Planners**: [`transaction::JoinTransaction`],
//!   [`transaction::ReleaseTransaction`] and
//!   [`transaction::UpdateEventTransaction`] turn a snapshot into a
//!   [`ledger::WriteSet`] or a semantic [`error::BookingError`]
//! - **Seams**: [`ledger_store::LedgerStore`], [`notification::NotificationSink`]
//!   and [`environment::Clock`], implemented by the other crates
//!
//! ## Invariants
//!
//! Between completed transactions, for every event:
//!
//! - `occupancy == Σ total_spots` over its bookings (plus one per legacy participant)
//! - `occupancy <= capacity`
//!
//! ## Example
//!
//! ```
//! use attendance_core::{
//!     Caller, EventDraft, EventId, Guest, JoinTransaction, LedgerSnapshot,
//!     LedgerTransaction, Version, Versioned,
//! };
//! use chrono::Utc;
//!
//! let host = Caller::new("host-1", "Hana");
//! let event = EventDraft::new("Pottery night", 6).into_event(EventId::new(), host.user_id, Utc::now());
//! let snapshot = LedgerSnapshot::new(Versioned::new(event.clone(), Version::INITIAL), None);
//!
//! let join = JoinTransaction::new(event.id, Caller::new("u-1", "Ana"), vec![Guest::named("Rui")]);
//! let plan = join.plan(&snapshot, Utc::now()).unwrap();
//!
//! assert_eq!(plan.output.total_spots, 2);
//! assert_eq!(plan.write_set.occupancy_delta(), 2);
//! ```

pub mod booking;
pub mod error;
pub mod event;
pub mod ids;
pub mod ledger;
pub mod ledger_store;
pub mod notification;
pub mod transaction;
pub mod version;

pub use booking::{Booking, Guest, spots_for};
pub use error::BookingError;
pub use event::{Capacity, Event, EventDraft, EventPatch, EventRecord, EventType};
pub use ids::{ANONYMOUS_DISPLAY_NAME, Caller, EventId, ParseIdError, UserId};
pub use ledger::{LedgerOp, LedgerSnapshot, Precondition, WriteSet};
pub use ledger_store::{LedgerStore, StoreError, StoreFuture};
pub use notification::{BookingNotice, NoticeKind, NotificationSink, NotifyError};
pub use transaction::{
    JoinTransaction, LedgerTransaction, Plan, ReleaseMode, ReleaseOutcome, ReleaseTransaction,
    UpdateEventTransaction,
};
pub use version::{Version, Versioned};

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// Injected dependencies that are not storage.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Booking timestamps come from the clock, never from `Utc::now()` directly,
    /// so tests can pin them with a fixed clock.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
