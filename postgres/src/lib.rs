//! `PostgreSQL` ledger store for the attendance booking engine.
//!
//! This crate implements the `LedgerStore` trait from `attendance-core` on sqlx:
//!
//! - Event rows carry a `version` column bumped on every commit
//! - Bookings are keyed by `(event_id, user_id)` and cascade with their event
//! - [`LedgerStore::commit`] locks the event row, checks the precondition and
//!   applies the write set inside one transaction
//! - Serialization failures, deadlocks and duplicate booking keys surface as
//!   [`StoreError::Conflict`], so the engine re-reads and plans again
//!
//! # Example
//!
//! ```ignore
//! use attendance_postgres::PostgresLedgerStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresLedgerStore::new("postgres://localhost/attendance").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;

use attendance_core::booking::Booking;
use attendance_core::event::Event;
use attendance_core::ids::{EventId, UserId};
use attendance_core::ledger::{LedgerOp, LedgerSnapshot, WriteSet};
use attendance_core::ledger_store::{LedgerStore, StoreError, StoreFuture};
use attendance_core::version::{Version, Versioned};
use rows::{
    BOOKING_COLUMNS, BookingRow, EVENT_COLUMNS, EventRow, guest_column, participant_column,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

/// Default connection pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// SQLSTATE codes that mean "someone else got there first".
const CONFLICT_CODES: [&str; 3] = [
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "23505", // unique_violation
];

/// `PostgreSQL`-backed [`LedgerStore`].
#[derive(Clone, Debug)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Connect with [`DEFAULT_MAX_CONNECTIONS`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        Self::with_max_connections(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connect with an explicit pool size.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn with_max_connections(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `events` and `bookings` tables if they don't already exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn read_snapshot(
        &self,
        event_id: EventId,
        user_id: &UserId,
    ) -> Result<Option<LedgerSnapshot>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| db_error(event_id, e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(event_id, e))?;

        let Some(event) = fetch_event(&mut tx, event_id, false).await? else {
            return Ok(None);
        };

        let booking: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE event_id = $1 AND user_id = $2"
        ))
        .bind(event_id.as_uuid())
        .bind(user_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error(event_id, e))?;

        tx.commit().await.map_err(|e| db_error(event_id, e))?;

        let booking = booking.map(Booking::try_from).transpose()?;
        Ok(Some(LedgerSnapshot::new(event, booking)))
    }

    async fn apply(&self, event_id: EventId, write_set: WriteSet) -> Result<Version, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| db_error(event_id, e))?;

        let Versioned {
            value: mut event,
            version,
        } = fetch_event(&mut tx, event_id, true)
            .await?
            .ok_or(StoreError::EventNotFound(event_id))?;

        let booking = match write_set.precondition.user() {
            Some(user_id) => {
                let row: Option<BookingRow> = sqlx::query_as(&format!(
                    "SELECT {BOOKING_COLUMNS} FROM bookings \
                     WHERE event_id = $1 AND user_id = $2 FOR UPDATE"
                ))
                .bind(event_id.as_uuid())
                .bind(user_id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_error(event_id, e))?;
                row.map(Booking::try_from).transpose()?
            }
            None => None,
        };

        if !write_set.precondition.holds(version, &event, booking.as_ref()) {
            tracing::debug!(event_id = %event_id, version = %version, "Precondition failed");
            metrics::counter!("ledger_store.conflicts", "reason" => "precondition").increment(1);
            return Err(StoreError::Conflict { event_id });
        }

        for op in &write_set.ops {
            match op {
                LedgerOp::PutBooking(booking) => insert_booking(&mut tx, booking).await?,
                LedgerOp::DeleteBooking(user_id) => {
                    sqlx::query("DELETE FROM bookings WHERE event_id = $1 AND user_id = $2")
                        .bind(event_id.as_uuid())
                        .bind(user_id.as_str())
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| db_error(event_id, e))?;
                }
                other => other.apply_to_event(&mut event),
            }
        }

        let next = version.next();
        update_event(&mut tx, &event, next).await?;
        tx.commit().await.map_err(|e| db_error(event_id, e))?;

        metrics::counter!("ledger_store.commits").increment(1);
        Ok(next)
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn insert_event(&self, event: Event) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                INSERT INTO events (
                    id, host_id, title, description, city, hobby, venue, starts_at,
                    capacity, event_type, max_tickets_per_user, occupancy, participants,
                    allow_cancellation, created_at, version
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                ",
            )
            .bind(event.id.as_uuid())
            .bind(event.host_id.as_str())
            .bind(&event.title)
            .bind(&event.description)
            .bind(&event.city)
            .bind(&event.hobby)
            .bind(&event.venue)
            .bind(event.starts_at)
            .bind(i64::from(event.capacity.value()))
            .bind(event.event_type.as_str())
            .bind(i64::from(event.max_tickets_per_user))
            .bind(i64::from(event.occupancy))
            .bind(participant_column(&event))
            .bind(event.allow_cancellation)
            .bind(event.created_at)
            .bind(version_column(Version::INITIAL)?)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(Version::INITIAL),
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    Err(StoreError::DuplicateEvent(event.id))
                }
                Err(e) => Err(StoreError::Database(e.to_string())),
            }
        })
    }

    fn load_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Versioned<Event>>> {
        Box::pin(async move {
            let row: Option<EventRow> =
                sqlx::query_as(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
                    .bind(event_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| db_error(event_id, e))?;
            row.map(EventRow::into_versioned).transpose()
        })
    }

    fn load_snapshot(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, Option<LedgerSnapshot>> {
        Box::pin(async move { self.read_snapshot(event_id, &user_id).await })
    }

    fn list_bookings(&self, event_id: EventId) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let rows: Vec<BookingRow> = sqlx::query_as(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE event_id = $1 \
                 ORDER BY created_at, user_id"
            ))
            .bind(event_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(event_id, e))?;
            rows.into_iter().map(Booking::try_from).collect()
        })
    }

    fn commit(&self, event_id: EventId, write_set: WriteSet) -> StoreFuture<'_, Version> {
        Box::pin(async move { self.apply(event_id, write_set).await })
    }

    fn delete_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(|e| db_error(event_id, e))?;

            let locked: Option<(uuid::Uuid,)> =
                sqlx::query_as("SELECT id FROM events WHERE id = $1 FOR UPDATE")
                    .bind(event_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| db_error(event_id, e))?;
            if locked.is_none() {
                return Err(StoreError::EventNotFound(event_id));
            }

            let removed: Vec<BookingRow> = sqlx::query_as(&format!(
                "DELETE FROM bookings WHERE event_id = $1 RETURNING {BOOKING_COLUMNS}"
            ))
            .bind(event_id.as_uuid())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| db_error(event_id, e))?;

            sqlx::query("DELETE FROM events WHERE id = $1")
                .bind(event_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(event_id, e))?;

            tx.commit().await.map_err(|e| db_error(event_id, e))?;

            tracing::info!(event_id = %event_id, bookings = removed.len(), "Event rows deleted");
            removed.into_iter().map(Booking::try_from).collect()
        })
    }
}

async fn fetch_event(
    tx: &mut Transaction<'_, Postgres>,
    event_id: EventId,
    for_update: bool,
) -> Result<Option<Versioned<Event>>, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row: Option<EventRow> =
        sqlx::query_as(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1{lock}"))
            .bind(event_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| db_error(event_id, e))?;
    row.map(EventRow::into_versioned).transpose()
}

async fn insert_booking(
    tx: &mut Transaction<'_, Postgres>,
    booking: &Booking,
) -> Result<(), StoreError> {
    let event_id = booking.event_id;
    let inserted = sqlx::query(
        r"
        INSERT INTO bookings (event_id, user_id, guest_count, guest_details, total_spots, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (event_id, user_id) DO NOTHING
        ",
    )
    .bind(event_id.as_uuid())
    .bind(booking.user_id.as_str())
    .bind(i64::from(booking.guest_count))
    .bind(guest_column(&booking.guest_details)?)
    .bind(i64::from(booking.total_spots))
    .bind(booking.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error(event_id, e))?;

    if inserted.rows_affected() == 0 {
        metrics::counter!("ledger_store.conflicts", "reason" => "duplicate_booking").increment(1);
        return Err(StoreError::Conflict { event_id });
    }
    Ok(())
}

async fn update_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
    version: Version,
) -> Result<(), StoreError> {
    sqlx::query(
        r"
        UPDATE events SET
            title = $2,
            description = $3,
            capacity = $4,
            event_type = $5,
            max_tickets_per_user = $6,
            occupancy = $7,
            participants = $8,
            allow_cancellation = $9,
            version = $10
        WHERE id = $1
        ",
    )
    .bind(event.id.as_uuid())
    .bind(&event.title)
    .bind(&event.description)
    .bind(i64::from(event.capacity.value()))
    .bind(event.event_type.as_str())
    .bind(i64::from(event.max_tickets_per_user))
    .bind(i64::from(event.occupancy))
    .bind(participant_column(event))
    .bind(event.allow_cancellation)
    .bind(version_column(version)?)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error(event.id, e))?;
    Ok(())
}

fn version_column(version: Version) -> Result<i64, StoreError> {
    i64::try_from(version.value())
        .map_err(|_| StoreError::Serialization(format!("version out of range: {version}")))
}

/// Map a driver error, turning contention into [`StoreError::Conflict`].
fn db_error(event_id: EventId, error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        if db
            .code()
            .is_some_and(|code| CONFLICT_CODES.contains(&code.as_ref()))
        {
            metrics::counter!("ledger_store.conflicts", "reason" => "sqlstate").increment(1);
            return StoreError::Conflict { event_id };
        }
    }
    StoreError::Database(error.to_string())
}
