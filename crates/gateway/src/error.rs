use thiserror::Error;

/// Errors raised while assembling a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The dispatcher was misconfigured (e.g. missing required components).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An error occurred in the usage store.
    #[error("usage store error: {0}")]
    Usage(#[from] rowgate_usage::UsageError),
}

/// Errors from the external collaborators reachable through the
/// [`RuntimeContext`](crate::RuntimeContext).
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// No implementation was configured for the collaborator.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// The collaborator was reached but the lookup failed.
    #[error("lookup failed: {0}")]
    Lookup(String),
}
