//! Identifiers and caller identity.
//!
//! Events are identified by a UUID minted when the host creates them. Users are
//! identified by whatever opaque string the identity provider hands us; the
//! engine never interprets it beyond equality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error type for identifier parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseIdError {
    /// The user identifier was empty.
    #[error("User ID cannot be empty")]
    EmptyUserId,

    /// The event identifier was not a valid UUID.
    #[error("Invalid event ID: {0}")]
    InvalidEventId(String),
}

/// Unique identifier for a hostable event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ParseIdError::InvalidEventId(s.to_string()))
    }
}

/// Opaque user identifier supplied by the identity provider.
///
/// # Validation
///
/// - `FromStr::from_str()`: rejects empty strings (use for external input)
/// - `new()` and `From`: no validation (use for trusted, already-verified ids)
///
/// # Examples
///
/// ```
/// use attendance_core::ids::UserId;
///
/// let user = UserId::new("uid-123");
/// assert_eq!(user.as_str(), "uid-123");
///
/// assert!("".parse::<UserId>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a new `UserId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the user ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `UserId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseIdError::EmptyUserId);
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Display name used when the identity provider supplies none.
pub const ANONYMOUS_DISPLAY_NAME: &str = "Someone";

/// Verified identity of the user performing an operation.
///
/// The identity provider has already authenticated this pair; the engine trusts it
/// and threads it explicitly through every call instead of reading request-global state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Who is acting
    pub user_id: UserId,
    /// Name shown to the host in notifications
    pub display_name: String,
}

impl Caller {
    /// Creates a caller with an explicit display name.
    #[must_use]
    pub fn new(user_id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Creates a caller for which the identity provider had no display name.
    #[must_use]
    pub fn anonymous(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id, ANONYMOUS_DISPLAY_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_rejects_empty_input() {
        assert_eq!("".parse::<UserId>(), Err(ParseIdError::EmptyUserId));
        assert_eq!("u1".parse::<UserId>(), Ok(UserId::new("u1")));
    }

    #[test]
    fn event_id_round_trips_through_display() {
        let id = EventId::new();
        let parsed: Result<EventId, _> = id.to_string().parse();
        assert_eq!(parsed, Ok(id));
    }

    #[test]
    fn event_id_rejects_garbage() {
        assert!(matches!(
            "not-a-uuid".parse::<EventId>(),
            Err(ParseIdError::InvalidEventId(_))
        ));
    }

    #[test]
    fn anonymous_caller_uses_fallback_name() {
        let caller = Caller::anonymous("u1");
        assert_eq!(caller.display_name, "Someone");
        assert_eq!(caller.user_id, UserId::new("u1"));
    }
}
