use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FunctionName, Identity};

/// Partition of daily usage: one identity, one function, one calendar day.
///
/// The day is the UTC calendar date of the instant the request was received,
/// so usage from different days never aggregates together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub identity: Identity,
    pub function: FunctionName,
    pub day: NaiveDate,
}

impl ScopeKey {
    /// Create a scope key for an explicit day.
    #[must_use]
    pub fn new(
        identity: impl Into<Identity>,
        function: impl Into<FunctionName>,
        day: NaiveDate,
    ) -> Self {
        Self {
            identity: identity.into(),
            function: function.into(),
            day,
        }
    }

    /// Create the scope key covering `at`.
    #[must_use]
    pub fn for_instant(
        identity: impl Into<Identity>,
        function: impl Into<FunctionName>,
        at: &DateTime<Utc>,
    ) -> Self {
        Self::new(identity, function, at.date_naive())
    }

    /// Return a canonical string representation: `identity/function/YYYY-MM-DD`
    ///
    /// `%` and `/` inside the identity and function are percent-encoded, so
    /// distinct keys never share a canonical form.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!(
            "{}/{}/{}",
            escape_component(self.identity.as_str()),
            escape_component(self.function.as_str()),
            self.day.format("%Y-%m-%d")
        )
    }
}

fn escape_component(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['%', '/']) {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(raw.replace('%', "%25").replace('/', "%2F"))
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn canonical_format() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let key = ScopeKey::new("alice@example.com", "is_email_valid", day);
        assert_eq!(key.canonical(), "alice@example.com/is_email_valid/2024-03-09");
        assert_eq!(key.to_string(), key.canonical());
    }

    #[test]
    fn separators_inside_components_are_escaped() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let a = ScopeKey::new("a/b", "c", day);
        let b = ScopeKey::new("a", "b/c", day);
        assert_eq!(a.canonical(), "a%2Fb/c/2024-03-09");
        assert_eq!(b.canonical(), "a/b%2Fc/2024-03-09");
        assert_ne!(a.canonical(), b.canonical());

        let literal = ScopeKey::new("a%2Fb", "c", day);
        assert_eq!(literal.canonical(), "a%252Fb/c/2024-03-09");
        assert_ne!(literal.canonical(), a.canonical());
    }

    #[test]
    fn day_boundary_splits_scopes() {
        let before = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let a = ScopeKey::for_instant("alice", "f", &before);
        let b = ScopeKey::for_instant("alice", "f", &after);
        assert_ne!(a, b);
        assert_ne!(a.canonical(), b.canonical());
    }

    #[test]
    fn same_day_shares_scope() {
        let morning = Utc.with_ymd_and_hms(2024, 3, 9, 1, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2024, 3, 9, 22, 0, 0).unwrap();
        assert_eq!(
            ScopeKey::for_instant("alice", "f", &morning),
            ScopeKey::for_instant("alice", "f", &evening)
        );
    }
}
