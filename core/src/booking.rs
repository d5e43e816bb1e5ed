//! Per-user reservation records.

use crate::ids::{EventId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Someone the attendee brings along.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    /// Guest name as entered by the attendee
    pub name: String,
    /// Optional contact address
    #[serde(default)]
    pub email: Option<String>,
}

impl Guest {
    /// Guest with a name only.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
        }
    }
}

/// Spots a booking consumes: the attendee plus each guest.
#[must_use]
pub fn spots_for(guest_count: usize) -> u32 {
    u32::try_from(guest_count)
        .unwrap_or(u32::MAX)
        .saturating_add(1)
}

/// One user's reservation against one event.
///
/// Keyed by `(event_id, user_id)`. There is no update path; changing the guest
/// list means releasing and booking again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Owning event
    pub event_id: EventId,
    /// Attendee holding the booking
    pub user_id: UserId,
    /// Number of guests
    pub guest_count: u32,
    /// Guests in the order they were listed
    pub guest_details: Vec<Guest>,
    /// Spots consumed, always `1 + guest_count`
    pub total_spots: u32,
    /// When the booking was committed
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Builds a booking, deriving the guest count and spot total from `guests`.
    #[must_use]
    pub fn new(
        event_id: EventId,
        user_id: UserId,
        guests: Vec<Guest>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let total_spots = spots_for(guests.len());
        Self {
            event_id,
            user_id,
            guest_count: total_spots - 1,
            guest_details: guests,
            total_spots,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spots_include_the_attendee() {
        assert_eq!(spots_for(0), 1);
        assert_eq!(spots_for(2), 3);
    }

    #[test]
    fn booking_derives_counts_from_guest_list() {
        let booking = Booking::new(
            EventId::new(),
            UserId::new("u1"),
            vec![Guest::named("Ana"), Guest::named("Rui")],
            Utc::now(),
        );

        assert_eq!(booking.guest_count, 2);
        assert_eq!(booking.total_spots, 3);
        assert_eq!(booking.guest_details[1].name, "Rui");
    }
}
