//! Ready-made engines, callers and event documents.

use crate::ledger_store::InMemoryLedgerStore;
use crate::mocks::test_clock;
use crate::notification_mocks::RecordingNotificationSink;
use attendance_core::booking::Guest;
use attendance_core::environment::Clock;
use attendance_core::event::EventRecord;
use attendance_core::ids::{Caller, EventId, UserId};
use attendance_core::notification::NotificationSink;
use attendance_runtime::dispatcher::{DispatchWorker, NotificationDispatcher};
use attendance_runtime::engine::{BookingEngine, TransactionPolicy};
use attendance_runtime::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

/// The host used throughout the fixtures.
#[must_use]
pub fn host() -> Caller {
    Caller::new("host-1", "Hana Host")
}

/// The `n`th attendee.
#[must_use]
pub fn attendee(n: usize) -> Caller {
    Caller::new(format!("user-{n}"), format!("Attendee {n}"))
}

/// `n` named guests.
#[must_use]
pub fn guests(n: usize) -> Vec<Guest> {
    (1..=n).map(|i| Guest::named(format!("Guest {i}"))).collect()
}

/// Policy with millisecond backoff and a generous retry budget, for fast tests.
#[must_use]
pub fn fast_policy() -> TransactionPolicy {
    TransactionPolicy::default()
        .with_retry(
            RetryPolicy::builder()
                .max_retries(64)
                .initial_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(5))
                .build(),
        )
        .with_deadline(Duration::from_secs(10))
}

/// A stored event document written before ticket fields existed: no type, no
/// limit, no occupancy counter, no cancellation flag. `participants` hold spots.
#[must_use]
pub fn legacy_record(host_id: &UserId, capacity: u32, participants: &[&str]) -> EventRecord {
    EventRecord {
        id: EventId::new(),
        host_id: host_id.clone(),
        title: "Legacy meetup".to_string(),
        description: String::new(),
        city: "Porto".to_string(),
        hobby: "hiking".to_string(),
        venue: "Trailhead".to_string(),
        starts_at: None,
        capacity,
        event_type: None,
        max_tickets_per_user: None,
        occupancy: None,
        participants: participants.iter().map(|p| UserId::new(*p)).collect(),
        allow_cancellation: None,
        created_at: test_clock().now(),
    }
}

/// Engine over an in-memory store, wired to a recording sink.
pub struct TestHarness {
    /// The engine under test
    pub engine: BookingEngine,
    /// Its store, for inspection and fault injection
    pub store: InMemoryLedgerStore,
    /// Receives every dispatched notice
    pub sink: RecordingNotificationSink,
    /// Notification worker
    pub worker: DispatchWorker,
}

impl TestHarness {
    /// Harness on a fresh store with [`fast_policy`] and the fixed test clock.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(InMemoryLedgerStore::new())
    }

    /// Harness on `store`.
    #[must_use]
    pub fn with_store(store: InMemoryLedgerStore) -> Self {
        let sink = RecordingNotificationSink::new();
        let (engine, worker) = engine_with_sink(store.clone(), Arc::new(sink.clone()));
        Self {
            engine,
            store,
            sink,
            worker,
        }
    }

    /// Drop the engine and wait until every queued notice has been handled.
    pub async fn drain(self) -> RecordingNotificationSink {
        let Self {
            engine,
            sink,
            worker,
            ..
        } = self;
        drop(engine);
        worker.join().await;
        sink
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine over `store` delivering to `sink`, with [`fast_policy`] and the test clock.
#[must_use]
pub fn engine_with_sink(
    store: InMemoryLedgerStore,
    sink: Arc<dyn NotificationSink>,
) -> (BookingEngine, DispatchWorker) {
    let (notifier, worker) = NotificationDispatcher::spawn(sink);
    let engine = BookingEngine::new(Arc::new(store), notifier)
        .with_clock(Arc::new(test_clock()))
        .with_policy(fast_policy());
    (engine, worker)
}
