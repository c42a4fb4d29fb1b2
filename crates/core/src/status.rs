use serde::{Deserialize, Serialize};

/// Lifecycle phase a request log event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Started,
    Success,
    QuotaError,
    AssertionError,
    Error,
}

impl LogStatus {
    /// Return the wire representation used in the `status` field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Success => "success",
            Self::QuotaError => "quota_error",
            Self::AssertionError => "assertion_error",
            Self::Error => "error",
        }
    }

    /// Log severity the event is emitted with.
    #[must_use]
    pub fn severity(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            _ => "INFO",
        }
    }

    /// Whether this status ends a request's lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
