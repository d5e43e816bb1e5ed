//! In-memory ledger store
//!
//! [`InMemoryLedgerStore`] keeps event records and bookings in a `HashMap`
//! behind one lock, so a commit is trivially atomic. Knobs for tests:
//! - injected commit failures (conflicts or store errors)
//! - artificial read and commit latency to widen race windows
//! - seeding of legacy event documents that lack the ticket fields

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Only the inspection helpers unwrap

use attendance_core::booking::Booking;
use attendance_core::event::{Event, EventRecord};
use attendance_core::ids::{EventId, UserId};
use attendance_core::ledger::{LedgerOp, LedgerSnapshot, WriteSet};
use attendance_core::ledger_store::{LedgerStore, StoreError, StoreFuture};
use attendance_core::version::{Version, Versioned};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

#[derive(Debug)]
struct StoredEvent {
    record: EventRecord,
    version: Version,
    bookings: HashMap<UserId, Booking>,
}

/// Failure queued for an upcoming commit.
#[derive(Debug)]
enum Injected {
    Conflict,
    Error(StoreError),
}

/// In-memory [`LedgerStore`] for fast, deterministic testing.
///
/// Clones share the same data.
///
/// # Example
///
/// ```
/// use attendance_testing::InMemoryLedgerStore;
/// use attendance_core::{EventDraft, EventId, LedgerStore, UserId, Version};
/// use chrono::Utc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryLedgerStore::new();
/// let event = EventDraft::new("Chess club", 8).into_event(EventId::new(), UserId::new("host"), Utc::now());
///
/// let version = store.insert_event(event.clone()).await?;
/// assert_eq!(version, Version::INITIAL);
/// assert!(store.load_event(event.id).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedgerStore {
    events: Arc<RwLock<HashMap<EventId, StoredEvent>>>,
    injected: Arc<Mutex<VecDeque<Injected>>>,
    commits: Arc<AtomicU64>,
    read_latency: Option<Duration>,
    commit_latency: Option<Duration>,
}

impl InMemoryLedgerStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before every snapshot read.
    #[must_use]
    pub const fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = Some(latency);
        self
    }

    /// Sleep this long before every commit, after the caller has read.
    ///
    /// Widens the read-to-commit window so concurrent writers really collide.
    #[must_use]
    pub const fn with_commit_latency(mut self, latency: Duration) -> Self {
        self.commit_latency = Some(latency);
        self
    }

    /// Make the next `n` commits fail with a conflict, whatever they contain.
    pub fn fail_next_commits(&self, n: usize) {
        let mut injected = self.injected.lock().unwrap();
        injected.extend(std::iter::repeat_with(|| Injected::Conflict).take(n));
    }

    /// Make the next commit fail with `error`.
    pub fn fail_next_commit_with(&self, error: StoreError) {
        self.injected.lock().unwrap().push_back(Injected::Error(error));
    }

    /// Store a raw event document as-is, e.g. one written before the ticket fields existed.
    pub fn seed_record(&self, record: EventRecord) {
        self.events.write().unwrap().insert(
            record.id,
            StoredEvent {
                record,
                version: Version::INITIAL,
                bookings: HashMap::new(),
            },
        );
    }

    /// The raw stored document.
    #[must_use]
    pub fn record(&self, event_id: EventId) -> Option<EventRecord> {
        self.events
            .read()
            .unwrap()
            .get(&event_id)
            .map(|stored| stored.record.clone())
    }

    /// Booking held by `user_id`, if any.
    #[must_use]
    pub fn booking(&self, event_id: EventId, user_id: &UserId) -> Option<Booking> {
        self.events
            .read()
            .unwrap()
            .get(&event_id)
            .and_then(|stored| stored.bookings.get(user_id).cloned())
    }

    /// Sum of `total_spots` across the event's bookings.
    #[must_use]
    pub fn booked_spots(&self, event_id: EventId) -> u32 {
        self.events
            .read()
            .unwrap()
            .get(&event_id)
            .map_or(0, |stored| stored.bookings.values().map(|b| b.total_spots).sum())
    }

    /// Number of successful commits so far.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().unwrap().len()
    }

    /// True when no event is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().unwrap().is_empty()
    }

    fn snapshot(&self, event_id: EventId, user_id: &UserId) -> Result<Option<LedgerSnapshot>, StoreError> {
        let events = self.events.read().map_err(|_| poisoned())?;
        Ok(events.get(&event_id).map(|stored| {
            LedgerSnapshot::new(
                Versioned::new(Event::from(stored.record.clone()), stored.version),
                stored.bookings.get(user_id).cloned(),
            )
        }))
    }

    fn apply(&self, event_id: EventId, write_set: WriteSet) -> Result<Version, StoreError> {
        let mut events = self.events.write().map_err(|_| poisoned())?;
        let stored = events
            .get_mut(&event_id)
            .ok_or(StoreError::EventNotFound(event_id))?;

        if let Some(injected) = self.injected.lock().map_err(|_| poisoned())?.pop_front() {
            return Err(match injected {
                Injected::Conflict => StoreError::Conflict { event_id },
                Injected::Error(error) => error,
            });
        }

        let mut event = Event::from(stored.record.clone());
        let booking = write_set
            .precondition
            .user()
            .and_then(|user_id| stored.bookings.get(user_id));
        if !write_set.precondition.holds(stored.version, &event, booking) {
            return Err(StoreError::Conflict { event_id });
        }

        // Work on copies so a failing op leaves the stored state untouched.
        let mut bookings = stored.bookings.clone();
        for op in &write_set.ops {
            match op {
                LedgerOp::PutBooking(booking) => {
                    if bookings.contains_key(&booking.user_id) {
                        return Err(StoreError::Conflict { event_id });
                    }
                    bookings.insert(booking.user_id.clone(), booking.clone());
                }
                LedgerOp::DeleteBooking(user_id) => {
                    bookings.remove(user_id);
                }
                other => other.apply_to_event(&mut event),
            }
        }

        stored.record = EventRecord::from(event);
        stored.bookings = bookings;
        stored.version = stored.version.next();
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(stored.version)
    }
}

fn poisoned() -> StoreError {
    StoreError::Database("in-memory store lock poisoned".to_string())
}

impl LedgerStore for InMemoryLedgerStore {
    fn insert_event(&self, event: Event) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let mut events = self.events.write().map_err(|_| poisoned())?;
            if events.contains_key(&event.id) {
                return Err(StoreError::DuplicateEvent(event.id));
            }
            events.insert(
                event.id,
                StoredEvent {
                    record: EventRecord::from(event.clone()),
                    version: Version::INITIAL,
                    bookings: HashMap::new(),
                },
            );
            Ok(Version::INITIAL)
        })
    }

    fn load_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Versioned<Event>>> {
        Box::pin(async move {
            let events = self.events.read().map_err(|_| poisoned())?;
            Ok(events.get(&event_id).map(|stored| {
                Versioned::new(Event::from(stored.record.clone()), stored.version)
            }))
        })
    }

    fn load_snapshot(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, Option<LedgerSnapshot>> {
        Box::pin(async move {
            if let Some(latency) = self.read_latency {
                tokio::time::sleep(latency).await;
            }
            self.snapshot(event_id, &user_id)
        })
    }

    fn list_bookings(&self, event_id: EventId) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let events = self.events.read().map_err(|_| poisoned())?;
            let mut bookings: Vec<Booking> = events
                .get(&event_id)
                .map(|stored| stored.bookings.values().cloned().collect())
                .unwrap_or_default();
            bookings.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.user_id.cmp(&b.user_id))
            });
            Ok(bookings)
        })
    }

    fn commit(&self, event_id: EventId, write_set: WriteSet) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            if let Some(latency) = self.commit_latency {
                tokio::time::sleep(latency).await;
            }
            self.apply(event_id, write_set)
        })
    }

    fn delete_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let mut events = self.events.write().map_err(|_| poisoned())?;
            let stored = events
                .remove(&event_id)
                .ok_or(StoreError::EventNotFound(event_id))?;
            Ok(stored.bookings.into_values().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attendance_core::event::EventDraft;
    use attendance_core::ledger::Precondition;
    use chrono::Utc;
    use smallvec::smallvec;

    fn event() -> Event {
        EventDraft::new("Chess", 4).into_event(EventId::new(), UserId::new("host"), Utc::now())
    }

    fn join_ops(event_id: EventId, user: &str) -> WriteSet {
        let booking = Booking::new(event_id, UserId::new(user), Vec::new(), Utc::now());
        WriteSet::new(
            Precondition::EventAt(Version::INITIAL),
            smallvec![
                LedgerOp::PutBooking(booking),
                LedgerOp::AdjustOccupancy(1),
                LedgerOp::AddParticipant(UserId::new(user)),
            ],
        )
    }

    #[tokio::test]
    async fn commit_bumps_version_and_applies_ops() {
        let store = InMemoryLedgerStore::new();
        let event = event();
        store.insert_event(event.clone()).await.unwrap();

        let version = store.commit(event.id, join_ops(event.id, "u1")).await.unwrap();

        assert_eq!(version, Version::new(2));
        let loaded = store.load_event(event.id).await.unwrap().unwrap();
        assert_eq!(loaded.value.occupancy, 1);
        assert_eq!(store.booked_spots(event.id), 1);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let store = InMemoryLedgerStore::new();
        let event = event();
        store.insert_event(event.clone()).await.unwrap();
        store.commit(event.id, join_ops(event.id, "u1")).await.unwrap();

        let result = store.commit(event.id, join_ops(event.id, "u2")).await;

        assert_eq!(result, Err(StoreError::Conflict { event_id: event.id }));
        assert_eq!(store.booked_spots(event.id), 1, "nothing from the failed write set");
    }

    #[tokio::test]
    async fn duplicate_booking_key_is_a_conflict_and_writes_nothing() {
        let store = InMemoryLedgerStore::new();
        let event = event();
        store.insert_event(event.clone()).await.unwrap();
        store.commit(event.id, join_ops(event.id, "u1")).await.unwrap();

        let mut again = join_ops(event.id, "u1");
        again.precondition = Precondition::EventAt(Version::new(2));
        let result = store.commit(event.id, again).await;

        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        let loaded = store.load_event(event.id).await.unwrap().unwrap();
        assert_eq!(loaded.value.occupancy, 1);
        assert_eq!(loaded.version, Version::new(2));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let store = InMemoryLedgerStore::new();
        let event = event();
        store.insert_event(event.clone()).await.unwrap();
        store.fail_next_commits(1);
        store.fail_next_commit_with(StoreError::Database("boom".to_string()));

        let first = store.commit(event.id, join_ops(event.id, "u1")).await;
        let second = store.commit(event.id, join_ops(event.id, "u1")).await;
        let third = store.commit(event.id, join_ops(event.id, "u1")).await;

        assert_eq!(first, Err(StoreError::Conflict { event_id: event.id }));
        assert_eq!(second, Err(StoreError::Database("boom".to_string())));
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn delete_cascades_to_bookings() {
        let store = InMemoryLedgerStore::new();
        let event = event();
        store.insert_event(event.clone()).await.unwrap();
        store.commit(event.id, join_ops(event.id, "u1")).await.unwrap();

        let removed = store.delete_event(event.id).await.unwrap();

        assert_eq!(removed.len(), 1);
        assert!(store.load_event(event.id).await.unwrap().is_none());
        assert!(store.booking(event.id, &UserId::new("u1")).is_none());
        assert_eq!(
            store.delete_event(event.id).await,
            Err(StoreError::EventNotFound(event.id))
        );
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let event = event();
        store.insert_event(event.clone()).await.unwrap();
        assert_eq!(
            store.insert_event(event.clone()).await,
            Err(StoreError::DuplicateEvent(event.id))
        );
    }
}
