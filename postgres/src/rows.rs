//! Row shapes and their conversion into domain values.

use attendance_core::booking::{Booking, Guest};
use attendance_core::event::{Event, EventRecord, EventType};
use attendance_core::ids::{EventId, UserId};
use attendance_core::ledger_store::StoreError;
use attendance_core::version::{Version, Versioned};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Columns selected for an event row, in [`EventRow`] order.
pub(crate) const EVENT_COLUMNS: &str = "id, host_id, title, description, city, hobby, venue, \
     starts_at, capacity, event_type, max_tickets_per_user, occupancy, participants, \
     allow_cancellation, created_at, version";

/// Columns selected for a booking row, in [`BookingRow`] order.
pub(crate) const BOOKING_COLUMNS: &str =
    "event_id, user_id, guest_count, guest_details, total_spots, created_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EventRow {
    id: Uuid,
    host_id: String,
    title: String,
    description: String,
    city: String,
    hobby: String,
    venue: String,
    starts_at: Option<DateTime<Utc>>,
    capacity: i64,
    event_type: Option<String>,
    max_tickets_per_user: Option<i64>,
    occupancy: Option<i64>,
    participants: Vec<String>,
    allow_cancellation: Option<bool>,
    created_at: DateTime<Utc>,
    version: i64,
}

impl EventRow {
    /// Decode the row, filling legacy gaps the way [`Event::from`] does.
    pub(crate) fn into_versioned(self) -> Result<Versioned<Event>, StoreError> {
        let event_type = self
            .event_type
            .map(|raw| raw.parse::<EventType>())
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let record = EventRecord {
            id: EventId::from_uuid(self.id),
            host_id: UserId::new(self.host_id),
            title: self.title,
            description: self.description,
            city: self.city,
            hobby: self.hobby,
            venue: self.venue,
            starts_at: self.starts_at,
            capacity: to_u32(self.capacity, "capacity")?,
            event_type,
            max_tickets_per_user: self
                .max_tickets_per_user
                .map(|limit| to_u32(limit, "max_tickets_per_user"))
                .transpose()?,
            occupancy: self
                .occupancy
                .map(|occupancy| to_u32(occupancy, "occupancy"))
                .transpose()?,
            participants: self.participants.into_iter().map(UserId::new).collect(),
            allow_cancellation: self.allow_cancellation,
            created_at: self.created_at,
        };

        let version = u64::try_from(self.version)
            .map_err(|_| StoreError::Serialization(format!("negative version {}", self.version)))?;
        Ok(Versioned::new(Event::from(record), Version::new(version)))
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BookingRow {
    event_id: Uuid,
    user_id: String,
    guest_count: i64,
    guest_details: serde_json::Value,
    total_spots: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            event_id: EventId::from_uuid(row.event_id),
            user_id: UserId::new(row.user_id),
            guest_count: to_u32(row.guest_count, "guest_count")?,
            guest_details: serde_json::from_value(row.guest_details)
                .map_err(|e| StoreError::Serialization(format!("guest_details: {e}")))?,
            total_spots: to_u32(row.total_spots, "total_spots")?,
            created_at: row.created_at,
        })
    }
}

/// Guest list as bound to the `JSONB` column.
pub(crate) fn guest_column(guests: &[Guest]) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(guests).map_err(|e| StoreError::Serialization(format!("guest_details: {e}")))
}

/// Participant ids as bound to the `TEXT[]` column.
pub(crate) fn participant_column(event: &Event) -> Vec<String> {
    event
        .participants
        .iter()
        .map(|user_id| user_id.as_str().to_owned())
        .collect()
}

fn to_u32(value: i64, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("{column} out of range: {value}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn legacy_row() -> EventRow {
        EventRow {
            id: Uuid::new_v4(),
            host_id: "host".to_string(),
            title: "Old meetup".to_string(),
            description: String::new(),
            city: String::new(),
            hobby: String::new(),
            venue: String::new(),
            starts_at: None,
            capacity: 8,
            event_type: None,
            max_tickets_per_user: None,
            occupancy: None,
            participants: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            allow_cancellation: None,
            created_at: Utc::now(),
            version: 3,
        }
    }

    #[test]
    fn legacy_rows_derive_occupancy_from_participants() {
        let loaded = legacy_row().into_versioned().unwrap();

        assert_eq!(loaded.version, Version::new(3));
        assert_eq!(loaded.value.occupancy, 3);
        assert_eq!(loaded.value.event_type, EventType::Solo);
        assert_eq!(loaded.value.ticket_limit(), 4);
        assert!(loaded.value.allow_cancellation);
    }

    #[test]
    fn unknown_event_type_is_a_serialization_error() {
        let mut row = legacy_row();
        row.event_type = Some("party".to_string());

        assert!(matches!(
            row.into_versioned(),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn negative_counters_are_rejected() {
        let mut row = legacy_row();
        row.occupancy = Some(-1);

        assert!(matches!(
            row.into_versioned(),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn booking_rows_decode_guest_details() {
        let row = BookingRow {
            event_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            guest_count: 1,
            guest_details: serde_json::json!([{ "name": "Bo" }]),
            total_spots: 2,
            created_at: Utc::now(),
        };

        let booking = Booking::try_from(row).unwrap();
        assert_eq!(booking.total_spots, 2);
        assert_eq!(booking.guest_details[0].name, "Bo");
        assert_eq!(booking.guest_details[0].email, None);
    }

    #[test]
    fn malformed_guest_details_are_rejected() {
        let row = BookingRow {
            event_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            guest_count: 1,
            guest_details: serde_json::json!({ "name": "Bo" }),
            total_spots: 2,
            created_at: Utc::now(),
        };

        assert!(matches!(
            Booking::try_from(row),
            Err(StoreError::Serialization(_))
        ));
    }
}
