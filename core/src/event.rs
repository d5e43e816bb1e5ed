//! The event side of the capacity ledger.
//!
//! An [`Event`] carries the authoritative capacity, the denormalized occupancy
//! counter and the set of users holding a booking. Stored documents may predate
//! some fields; [`EventRecord`] is that stored shape and `Event::from(record)` is
//! the one place where missing fields are defaulted.

use crate::error::BookingError;
use crate::ids::{EventId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Value Objects
// ============================================================================

/// Kind of gathering, which determines the default per-user ticket limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Individual attendance, small parties
    #[default]
    Solo,
    /// Teams and larger parties
    Group,
}

impl EventType {
    /// Ticket limit applied when the event does not set one explicitly.
    #[must_use]
    pub const fn default_ticket_limit(self) -> u32 {
        match self {
            Self::Solo => 4,
            Self::Group => 10,
        }
    }

    /// Stable lowercase name, as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Solo => "solo",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "solo" => Ok(Self::Solo),
            "group" => Ok(Self::Group),
            other => Err(BookingError::InvalidEvent(format!(
                "unknown event type '{other}'"
            ))),
        }
    }
}

/// Total number of spots an event offers.
///
/// Built through [`Capacity::new`]; the inner value is not writable from outside:
///
/// ```compile_fail
/// let capacity = attendance_core::Capacity(0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Capacity(u32);

impl Capacity {
    /// Creates a new `Capacity`
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the capacity value
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event
// ============================================================================

/// A hostable gathering, normalized with every field present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identity
    pub id: EventId,
    /// User who created the event and may manage it
    pub host_id: UserId,
    /// Event title
    pub title: String,
    /// Free-form description
    pub description: String,
    /// City the event takes place in
    pub city: String,
    /// Hobby or category
    pub hobby: String,
    /// Venue name or address
    pub venue: String,
    /// Scheduled start, if the host provided one
    pub starts_at: Option<DateTime<Utc>>,
    /// Maximum number of spots
    pub capacity: Capacity,
    /// Solo or group
    pub event_type: EventType,
    /// Largest booking (attendee plus guests) a single user may hold
    pub max_tickets_per_user: u32,
    /// Running total of reserved spots across all bookings
    pub occupancy: u32,
    /// Users currently holding a booking
    pub participants: BTreeSet<UserId>,
    /// Whether attendees may release their own booking
    pub allow_cancellation: bool,
    /// When the event was created
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Spots still available.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.capacity.value().saturating_sub(self.occupancy)
    }

    /// True when no spot is left.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.occupancy >= self.capacity.value()
    }

    /// Largest booking a single user may hold.
    #[must_use]
    pub const fn ticket_limit(&self) -> u32 {
        self.max_tickets_per_user
    }

    /// True when `user_id` hosts this event.
    #[must_use]
    pub fn is_host(&self, user_id: &UserId) -> bool {
        self.host_id == *user_id
    }

    /// True when `user_id` is in the participant set.
    #[must_use]
    pub fn is_participant(&self, user_id: &UserId) -> bool {
        self.participants.contains(user_id)
    }

    /// Applies a host patch in place. Validation happens in the planner.
    pub fn apply_patch(&mut self, patch: &EventPatch) {
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(description) = &patch.description {
            self.description.clone_from(description);
        }
        if let Some(capacity) = patch.capacity {
            self.capacity = Capacity::new(capacity);
        }
        if let Some(limit) = patch.max_tickets_per_user {
            self.max_tickets_per_user = limit;
        }
        if let Some(allow) = patch.allow_cancellation {
            self.allow_cancellation = allow;
        }
    }
}

// ============================================================================
// Stored Shape & Normalization
// ============================================================================

/// Event document as persisted.
///
/// Older documents were written before the ticket system existed and carry no
/// type, no per-user limit, no occupancy counter (only the participant list) and
/// no cancellation flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event identity
    pub id: EventId,
    /// Host user
    pub host_id: UserId,
    /// Title
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// City
    #[serde(default)]
    pub city: String,
    /// Hobby
    #[serde(default)]
    pub hobby: String,
    /// Venue
    #[serde(default)]
    pub venue: String,
    /// Scheduled start
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    /// Capacity
    pub capacity: u32,
    /// Event type, absent on legacy documents
    #[serde(default)]
    pub event_type: Option<EventType>,
    /// Per-user limit, absent on legacy documents
    #[serde(default)]
    pub max_tickets_per_user: Option<u32>,
    /// Occupancy counter, absent on legacy documents
    #[serde(default)]
    pub occupancy: Option<u32>,
    /// Participant list
    #[serde(default)]
    pub participants: Vec<UserId>,
    /// Cancellation flag, absent on legacy documents
    #[serde(default)]
    pub allow_cancellation: Option<bool>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl From<EventRecord> for Event {
    fn from(record: EventRecord) -> Self {
        let filled_defaults = record.event_type.is_none()
            || record.max_tickets_per_user.is_none()
            || record.occupancy.is_none()
            || record.allow_cancellation.is_none();

        let event_type = record.event_type.unwrap_or_default();
        let max_tickets_per_user = record
            .max_tickets_per_user
            .filter(|limit| *limit > 0)
            .unwrap_or_else(|| event_type.default_ticket_limit());
        let participants: BTreeSet<UserId> = record.participants.into_iter().collect();
        let occupancy = record
            .occupancy
            .unwrap_or_else(|| u32::try_from(participants.len()).unwrap_or(u32::MAX));

        if filled_defaults {
            tracing::debug!(event_id = %record.id, "Normalized legacy event document");
        }

        Self {
            id: record.id,
            host_id: record.host_id,
            title: record.title,
            description: record.description,
            city: record.city,
            hobby: record.hobby,
            venue: record.venue,
            starts_at: record.starts_at,
            capacity: Capacity::new(record.capacity),
            event_type,
            max_tickets_per_user,
            occupancy,
            participants,
            allow_cancellation: record.allow_cancellation.unwrap_or(true),
            created_at: record.created_at,
        }
    }
}

impl From<Event> for EventRecord {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            host_id: event.host_id,
            title: event.title,
            description: event.description,
            city: event.city,
            hobby: event.hobby,
            venue: event.venue,
            starts_at: event.starts_at,
            capacity: event.capacity.value(),
            event_type: Some(event.event_type),
            max_tickets_per_user: Some(event.max_tickets_per_user),
            occupancy: Some(event.occupancy),
            participants: event.participants.into_iter().collect(),
            allow_cancellation: Some(event.allow_cancellation),
            created_at: event.created_at,
        }
    }
}

// ============================================================================
// Commands Input
// ============================================================================

/// Host input for creating an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Title (required)
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// City
    #[serde(default)]
    pub city: String,
    /// Hobby
    #[serde(default)]
    pub hobby: String,
    /// Venue
    #[serde(default)]
    pub venue: String,
    /// Scheduled start
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    /// Capacity, at least 1
    pub capacity: u32,
    /// Event type
    #[serde(default)]
    pub event_type: EventType,
    /// Per-user limit; the type default applies when absent
    #[serde(default)]
    pub max_tickets_per_user: Option<u32>,
    /// Whether attendees may leave on their own
    #[serde(default = "default_allow_cancellation")]
    pub allow_cancellation: bool,
}

const fn default_allow_cancellation() -> bool {
    true
}

impl EventDraft {
    /// Minimal draft with the given title and capacity; everything else defaulted.
    #[must_use]
    pub fn new(title: impl Into<String>, capacity: u32) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            city: String::new(),
            hobby: String::new(),
            venue: String::new(),
            starts_at: None,
            capacity,
            event_type: EventType::Solo,
            max_tickets_per_user: None,
            allow_cancellation: true,
        }
    }

    /// Sets the event type.
    #[must_use]
    pub const fn with_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    /// Sets an explicit per-user ticket limit.
    #[must_use]
    pub const fn with_ticket_limit(mut self, limit: u32) -> Self {
        self.max_tickets_per_user = Some(limit);
        self
    }

    /// Sets whether attendees may cancel.
    #[must_use]
    pub const fn with_cancellation(mut self, allow: bool) -> Self {
        self.allow_cancellation = allow;
        self
    }

    /// Checks the draft before an event is created from it.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidEvent`] for a blank title, zero capacity or a
    /// zero ticket limit.
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.title.trim().is_empty() {
            return Err(BookingError::InvalidEvent("title is required".to_string()));
        }
        if self.capacity == 0 {
            return Err(BookingError::InvalidEvent(
                "capacity must be at least 1".to_string(),
            ));
        }
        if self.max_tickets_per_user == Some(0) {
            return Err(BookingError::InvalidEvent(
                "max tickets per user must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the event this draft describes, hosted by `host_id`.
    #[must_use]
    pub fn into_event(self, id: EventId, host_id: UserId, created_at: DateTime<Utc>) -> Event {
        let max_tickets_per_user = self
            .max_tickets_per_user
            .unwrap_or_else(|| self.event_type.default_ticket_limit());

        Event {
            id,
            host_id,
            title: self.title,
            description: self.description,
            city: self.city,
            hobby: self.hobby,
            venue: self.venue,
            starts_at: self.starts_at,
            capacity: Capacity::new(self.capacity),
            event_type: self.event_type,
            max_tickets_per_user,
            occupancy: 0,
            participants: BTreeSet::new(),
            allow_cancellation: self.allow_cancellation,
            created_at,
        }
    }
}

/// Partial update applied by the host. Absent fields stay unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New capacity; must stay at or above current occupancy
    pub capacity: Option<u32>,
    /// New per-user limit; applies to future bookings only
    pub max_tickets_per_user: Option<u32>,
    /// New cancellation flag
    pub allow_cancellation: Option<bool>,
}

impl EventPatch {
    /// Patch that only changes capacity.
    #[must_use]
    pub fn capacity(capacity: u32) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// True when the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.capacity.is_none()
            && self.max_tickets_per_user.is_none()
            && self.allow_cancellation.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn legacy_record(participants: &[&str]) -> EventRecord {
        EventRecord {
            id: EventId::new(),
            host_id: UserId::new("host"),
            title: "Board games".to_string(),
            description: String::new(),
            city: "Lisbon".to_string(),
            hobby: "games".to_string(),
            venue: "Cafe".to_string(),
            starts_at: None,
            capacity: 8,
            event_type: None,
            max_tickets_per_user: None,
            occupancy: None,
            participants: participants.iter().map(|p| UserId::new(*p)).collect(),
            allow_cancellation: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn legacy_document_gets_defaults_once() {
        let event = Event::from(legacy_record(&["a", "b", "c"]));

        assert_eq!(event.event_type, EventType::Solo);
        assert_eq!(event.max_tickets_per_user, 4);
        assert_eq!(event.occupancy, 3, "occupancy falls back to participant count");
        assert!(event.allow_cancellation);
    }

    #[test]
    fn group_type_without_limit_defaults_to_ten() {
        let mut record = legacy_record(&[]);
        record.event_type = Some(EventType::Group);
        let event = Event::from(record);
        assert_eq!(event.max_tickets_per_user, 10);
    }

    #[test]
    fn stored_zero_limit_is_treated_as_missing() {
        let mut record = legacy_record(&[]);
        record.max_tickets_per_user = Some(0);
        assert_eq!(Event::from(record).max_tickets_per_user, 4);
    }

    #[test]
    fn record_written_back_is_fully_populated() {
        let event = Event::from(legacy_record(&["a"]));
        let record = EventRecord::from(event.clone());

        assert_eq!(record.occupancy, Some(1));
        assert_eq!(record.max_tickets_per_user, Some(4));
        assert_eq!(record.event_type, Some(EventType::Solo));
        assert_eq!(Event::from(record), event);
    }

    #[test]
    fn legacy_json_without_ticket_fields_deserializes() {
        let json = serde_json::json!({
            "id": EventId::new(),
            "host_id": "host",
            "title": "Hike",
            "capacity": 12,
            "participants": ["u1"],
            "created_at": "2025-01-01T00:00:00Z"
        });
        let record: EventRecord = serde_json::from_value(json).unwrap();
        let event = Event::from(record);
        assert_eq!(event.occupancy, 1);
        assert_eq!(event.capacity, Capacity::new(12));
    }

    #[test]
    fn draft_validation() {
        assert!(EventDraft::new("Picnic", 10).validate().is_ok());
        assert!(EventDraft::new("  ", 10).validate().is_err());
        assert!(EventDraft::new("Picnic", 0).validate().is_err());
        assert!(EventDraft::new("Picnic", 10).with_ticket_limit(0).validate().is_err());
    }

    #[test]
    fn draft_uses_type_default_limit() {
        let now = Utc::now();
        let solo = EventDraft::new("Run", 5).into_event(EventId::new(), UserId::new("h"), now);
        let group = EventDraft::new("Quiz", 50)
            .with_type(EventType::Group)
            .into_event(EventId::new(), UserId::new("h"), now);
        let explicit = EventDraft::new("Gala", 50)
            .with_ticket_limit(2)
            .into_event(EventId::new(), UserId::new("h"), now);

        assert_eq!(solo.max_tickets_per_user, 4);
        assert_eq!(group.max_tickets_per_user, 10);
        assert_eq!(explicit.max_tickets_per_user, 2);
        assert_eq!(solo.occupancy, 0);
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let mut event = Event::from(legacy_record(&[]));
        event.apply_patch(&EventPatch {
            title: Some("Renamed".to_string()),
            capacity: Some(20),
            ..EventPatch::default()
        });

        assert_eq!(event.title, "Renamed");
        assert_eq!(event.capacity, Capacity::new(20));
        assert_eq!(event.city, "Lisbon");
        assert!(EventPatch::default().is_empty());
        assert!(!EventPatch::capacity(3).is_empty());
    }

    #[test]
    fn event_type_parses_case_insensitively() {
        assert_eq!("GROUP".parse::<EventType>(), Ok(EventType::Group));
        assert!("party".parse::<EventType>().is_err());
    }
}
