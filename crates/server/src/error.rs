use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that can occur when starting or running the Rowgate server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The dispatcher could not be assembled.
    #[error("gateway error: {0}")]
    Gateway(#[from] rowgate_gateway::GatewayError),

    /// The usage store could not be reached or initialized.
    #[error("usage store error: {0}")]
    Usage(#[from] rowgate_usage::UsageError),

    /// A cloud collaborator (metadata server, secret store) failed at startup.
    #[error("collaborator error: {0}")]
    Collaborator(#[from] rowgate_gateway::CollaboratorError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Usage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Io(_) | Self::Gateway(_) | Self::Collaborator(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_are_unavailable() {
        let response =
            ServerError::Usage(rowgate_usage::UsageError::Connection("down".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn config_errors_are_internal() {
        let response = ServerError::Config("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
