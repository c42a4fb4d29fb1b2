use thiserror::Error;

/// Errors from usage store operations.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl UsageError {
    /// Short error kind reported to callers as `<kind>: <message>`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "UsageStoreUnavailable",
            Self::Serialization(_) => "UsageStoreSerializationError",
            Self::Backend(_) => "UsageStoreError",
        }
    }
}
