//! Quota policy evaluation.
//!
//! Two limits exist. `max_rows_per_query` is checked first, without I/O, on
//! every backend. `max_rows_per_user_per_day` needs a persistent usage store:
//! today's aggregate for the scope plus this request's rows must not exceed
//! the limit, and an accepted request appends its usage record before the
//! computation runs. The store does the comparison and the append as one
//! step, so concurrent requests for a scope cannot jointly overshoot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use rowgate_core::{QuotaConfig, QuotaViolation, RequestId, ScopeKey, UsageRecord};
use rowgate_usage::{Admission, UsageError, UsageStore};

/// Where daily usage is read from and recorded to.
#[derive(Clone)]
pub enum QuotaBackend {
    /// Nothing is recorded; only the per-query limit is enforced.
    NoOp,
    /// Usage is aggregated from and appended to a store.
    Persistent(Arc<dyn UsageStore>),
}

impl QuotaBackend {
    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoOp => "none",
            Self::Persistent(store) => store.backend(),
        }
    }
}

impl std::fmt::Debug for QuotaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("QuotaBackend").field(&self.label()).finish()
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow,
    Deny(QuotaViolation),
}

/// Immutable quota limits bound to a usage backend.
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    config: QuotaConfig,
    backend: QuotaBackend,
}

impl QuotaPolicy {
    #[must_use]
    pub fn new(config: QuotaConfig, backend: QuotaBackend) -> Self {
        Self { config, backend }
    }

    /// Policy with no limits and no store.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(QuotaConfig::default(), QuotaBackend::NoOp)
    }

    #[must_use]
    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    #[must_use]
    pub fn backend(&self) -> &QuotaBackend {
        &self.backend
    }

    /// Decide whether a request of `row_count` rows charged to `scope` may
    /// run.
    ///
    /// On `Allow` with a daily limit in force, exactly one [`UsageRecord`]
    /// has been appended. A denied request never touches the store's record
    /// set. Store failures are returned as errors, never as denials.
    #[instrument(
        name = "quota.check",
        skip(self, request_id, at),
        fields(scope = %scope, backend = self.backend.label())
    )]
    pub async fn check_quotas(
        &self,
        scope: &ScopeKey,
        row_count: u64,
        request_id: &RequestId,
        at: DateTime<Utc>,
    ) -> Result<QuotaDecision, UsageError> {
        if let Some(limit) = self.config.max_rows_per_query
            && row_count > limit
        {
            info!(limit, row_count, "per-query row limit exceeded");
            return Ok(QuotaDecision::Deny(QuotaViolation::RowsPerQuery {
                limit,
                row_count,
            }));
        }

        let (Some(limit), QuotaBackend::Persistent(store)) =
            (self.config.max_rows_per_user_per_day, &self.backend)
        else {
            return Ok(QuotaDecision::Allow);
        };

        let record = UsageRecord::new(scope, request_id.clone(), row_count, at);
        match store.append_within(record, limit).await? {
            Admission::Rejected { total } => {
                info!(limit, total, row_count, "daily row limit exceeded");
                Ok(QuotaDecision::Deny(QuotaViolation::RowsPerUserPerDay {
                    limit,
                    total,
                }))
            }
            Admission::Appended { total } => {
                debug!(total, row_count, "usage recorded");
                Ok(QuotaDecision::Allow)
            }
        }
    }
}
