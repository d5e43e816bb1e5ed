//! # Attendance Testing
//!
//! Testing utilities for the booking engine.
//!
//! This crate provides:
//! - [`InMemoryLedgerStore`]: versioned in-memory store with fault injection
//! - Notification sinks that record, fail or stall
//! - [`FixedClock`] for deterministic timestamps
//! - Fixtures: callers, guests, legacy documents and a ready [`TestHarness`]
//! - proptest strategies for guest lists
//!
//! ## Example
//!
//! ```ignore
//! use attendance_testing::{TestHarness, attendee, guests, host};
//! use attendance_core::EventDraft;
//!
//! #[tokio::test]
//! async fn join_with_guests() {
//!     let harness = TestHarness::new();
//!     let event = harness.engine.create_event(&host(), EventDraft::new("Quiz", 10)).await?;
//!
//!     let booking = harness.engine.join_event(event.id, &attendee(1), guests(2)).await?;
//!     assert_eq!(booking.total_spots, 3);
//! }
//! ```

use attendance_core::environment::Clock;
use chrono::{DateTime, Utc};

/// Ready-made callers, documents and engines
pub mod fixtures;

/// In-memory ledger store
pub mod ledger_store;

/// Recording, failing and stalled notification sinks
pub mod notification_mocks;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making booking timestamps reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use attendance_testing::mocks::FixedClock;
    /// use attendance_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Property-based testing strategies.
pub mod properties {
    use attendance_core::booking::Guest;
    use proptest::prelude::*;

    /// A guest with a short name and an optional address.
    pub fn guest() -> impl Strategy<Value = Guest> {
        ("[A-Z][a-z]{1,8}", proptest::option::of("[a-z]{3,6}@example\\.com"))
            .prop_map(|(name, email)| Guest { name, email })
    }

    /// Up to `max` guests.
    pub fn guest_list(max: usize) -> impl Strategy<Value = Vec<Guest>> {
        proptest::collection::vec(guest(), 0..=max)
    }
}

/// Install a `tracing` subscriber writing to the test output.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use fixtures::{TestHarness, attendee, engine_with_sink, fast_policy, guests, host, legacy_record};
pub use ledger_store::InMemoryLedgerStore;
pub use mocks::{FixedClock, test_clock};
pub use notification_mocks::{
    FailingNotificationSink, RecordingNotificationSink, StalledNotificationSink,
};
