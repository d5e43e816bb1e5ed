//! Document revisions for optimistic concurrency control.
//!
//! Every committed write set bumps the owning event's `Version` by one. A
//! transaction that planned against version `N` may only commit while the event
//! is still at `N`; otherwise the store reports a conflict and the engine
//! re-reads and re-plans.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Revision number of an event document.
///
/// Versions start at [`Version::INITIAL`] when the event is created and increase
/// by one for each committed write set.
///
/// # Examples
///
/// ```
/// use attendance_core::version::Version;
///
/// let v1 = Version::INITIAL;
/// assert_eq!(v1.next(), Version::new(2));
/// assert_eq!(Version::new(5).value(), 5);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The version of a freshly created event.
    pub const INITIAL: Self = Self(1);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    ///
    /// Saturates at `u64::MAX`, which no event will ever reach.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A value read from the store together with the revision it was read at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The loaded value
    pub value: T,
    /// Revision the value was read at
    pub version: Version,
}

impl<T> Versioned<T> {
    /// Pairs a value with its revision.
    #[must_use]
    pub const fn new(value: T, version: Version) -> Self {
        Self { value, version }
    }

    /// Transforms the value while keeping the revision.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            value: f(self.value),
            version: self.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_version_is_one() {
        assert_eq!(Version::INITIAL, Version::new(1));
    }

    #[test]
    fn next_version() {
        let v1 = Version::INITIAL;
        let v2 = v1.next();
        assert_eq!(v2, Version::new(2));
        assert!(v2 > v1);
    }

    #[test]
    fn next_saturates() {
        assert_eq!(Version::new(u64::MAX).next(), Version::new(u64::MAX));
    }

    #[test]
    fn version_from_u64() {
        let version = Version::from(42_u64);
        assert_eq!(version.value(), 42);

        let num: u64 = version.into();
        assert_eq!(num, 42);
    }

    #[test]
    fn versioned_map_keeps_revision() {
        let loaded = Versioned::new(3_u32, Version::new(7));
        let mapped = loaded.map(|n| n * 2);
        assert_eq!(mapped.value, 6);
        assert_eq!(mapped.version, Version::new(7));
    }
}
