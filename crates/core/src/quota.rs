use serde::{Deserialize, Serialize};

/// Which usage store backs the daily quota.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageBackendKind {
    /// No usage is recorded; only the per-call limit applies.
    #[default]
    None,
    /// In-process store. Usage is lost on restart.
    Memory,
    /// `PostgreSQL` table of usage records.
    #[serde(alias = "datastore")]
    Postgres,
    /// Redis list of usage records plus per-scope totals.
    Redis,
}

impl UsageBackendKind {
    /// Whether this backend records usage across requests.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Return a short label for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Memory => "memory",
            Self::Postgres => "postgres",
            Self::Redis => "redis",
        }
    }
}

impl std::fmt::Display for UsageBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quota limits applied uniformly to every request for the process lifetime.
///
/// # Example
///
/// ```toml
/// [quotas]
/// max_rows_per_query = 100
/// max_rows_per_user_per_day = 10000
/// backend = "postgres"
/// contact = "data-platform@example.com"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Hard cap on rows in a single request.
    #[serde(default)]
    pub max_rows_per_query: Option<u64>,
    /// Cap on rows per identity per calendar day. Needs a persistent backend.
    #[serde(default)]
    pub max_rows_per_user_per_day: Option<u64>,
    /// Usage store selection.
    #[serde(default)]
    pub backend: UsageBackendKind,
    /// Who to ask for a quota increase; shown in quota error messages.
    #[serde(default)]
    pub contact: Option<String>,
}

impl QuotaConfig {
    /// `true` when a daily limit is configured but the backend cannot
    /// enforce it.
    #[must_use]
    pub fn daily_limit_ignored(&self) -> bool {
        self.max_rows_per_user_per_day.is_some() && !self.backend.is_persistent()
    }

    /// Contact shown in quota messages.
    #[must_use]
    pub fn contact_or_default(&self) -> &str {
        self.contact.as_deref().unwrap_or("the function owner")
    }
}

/// A quota a request would exceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaViolation {
    /// The request alone carries more rows than one call may.
    RowsPerQuery { limit: u64, row_count: u64 },
    /// Today's usage plus this request exceeds the daily allowance.
    RowsPerUserPerDay { limit: u64, total: u64 },
}

impl std::fmt::Display for QuotaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RowsPerQuery { limit, row_count } => write!(
                f,
                "It only accepts {limit} rows per query and you called it now on {row_count} rows or more"
            ),
            Self::RowsPerUserPerDay { limit, total } => write!(
                f,
                "It only accepts {limit} rows per day per user and you called it today for {total} rows"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        quotas: QuotaConfig,
    }

    #[test]
    fn defaults_have_no_limits() {
        let config: QuotaConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, QuotaConfig::default());
        assert_eq!(config.backend, UsageBackendKind::None);
        assert!(!config.daily_limit_ignored());
        assert_eq!(config.contact_or_default(), "the function owner");
    }

    #[test]
    fn parses_full_config() {
        let config: QuotaConfig = serde_json::from_value(serde_json::json!({
            "max_rows_per_query": 100,
            "max_rows_per_user_per_day": 1000,
            "backend": "redis",
            "contact": "ops@example.com",
        }))
        .unwrap();
        assert_eq!(config.max_rows_per_query, Some(100));
        assert_eq!(config.max_rows_per_user_per_day, Some(1000));
        assert_eq!(config.backend, UsageBackendKind::Redis);
        assert_eq!(config.contact_or_default(), "ops@example.com");
    }

    #[test]
    fn datastore_is_an_alias_for_postgres() {
        let w: Wrapper =
            serde_json::from_str(r#"{"quotas": {"backend": "datastore"}}"#).unwrap();
        assert_eq!(w.quotas.backend, UsageBackendKind::Postgres);
    }

    #[test]
    fn daily_limit_without_persistent_backend_is_flagged() {
        let config = QuotaConfig {
            max_rows_per_user_per_day: Some(10),
            ..QuotaConfig::default()
        };
        assert!(config.daily_limit_ignored());

        let config = QuotaConfig {
            backend: UsageBackendKind::Memory,
            ..config
        };
        assert!(!config.daily_limit_ignored());
    }

    #[test]
    fn violation_messages_name_the_limit() {
        let v = QuotaViolation::RowsPerQuery {
            limit: 100,
            row_count: 150,
        };
        assert_eq!(
            v.to_string(),
            "It only accepts 100 rows per query and you called it now on 150 rows or more"
        );

        let v = QuotaViolation::RowsPerUserPerDay {
            limit: 1000,
            total: 1010,
        };
        assert!(v.to_string().contains("1000 rows per day per user"));
        assert!(v.to_string().contains("1010 rows"));
    }
}
