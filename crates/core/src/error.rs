use thiserror::Error;

/// Errors raised while turning a raw body into a batch request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

impl RequestError {
    /// Short error kind reported to callers as `<kind>: <message>`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "InvalidPayload",
        }
    }
}
