//! Timestamped values for whole-file durable entities.
//!
//! Values that the dashboard revalidates against the remote service (the user
//! profile in particular) are persisted together with the time they were
//! stored, so callers can judge how stale they are.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A value plus the time it was written to the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamped<T> {
    /// The cached value.
    value: T,
    /// When this value was stored.
    stored_at: DateTime<Utc>,
}

impl<T> Stamped<T> {
    /// Stamp `value` with the current time.
    pub fn now(value: T) -> Self {
        Self::at(value, Utc::now())
    }

    pub fn at(value: T, stored_at: DateTime<Utc>) -> Self {
        Self { value, stored_at }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    /// Time elapsed since the value was stored. Zero if `stored_at` is in the future.
    pub fn staleness(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.stored_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// True if the value was stored no more than `max_age` ago.
    pub fn is_fresh_within(&self, max_age: Duration) -> bool {
        self.staleness() <= max_age
    }

    pub fn map<U, F>(self, f: F) -> Stamped<U>
    where
        F: FnOnce(T) -> U,
    {
        Stamped {
            value: f(self.value),
            stored_at: self.stored_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness() {
        let past = Utc::now() - chrono::Duration::seconds(5);
        let stamped = Stamped::at("profile", past);

        let staleness = stamped.staleness();
        assert!(staleness >= Duration::from_secs(4));
        assert!(staleness <= Duration::from_secs(10));
        assert!(stamped.is_fresh_within(Duration::from_secs(60)));
        assert!(!stamped.is_fresh_within(Duration::from_secs(1)));
    }

    #[test]
    fn test_future_stamp_has_zero_staleness() {
        let future = Utc::now() + chrono::Duration::minutes(5);
        let stamped = Stamped::at(1u8, future);
        assert_eq!(stamped.staleness(), Duration::ZERO);
    }

    #[test]
    fn test_map_keeps_timestamp() {
        let stamped = Stamped::now(42i32);
        let stored_at = stamped.stored_at();
        let mapped = stamped.map(|v| v.to_string());
        assert_eq!(mapped.stored_at(), stored_at);
        assert_eq!(mapped.into_value(), "42");
    }

    #[test]
    fn test_document_shape() {
        let stamped = Stamped::now(7u32);
        let json = serde_json::to_value(&stamped).unwrap();
        assert_eq!(json["value"], 7);
        assert!(json.get("stored_at").is_some());
    }
}
