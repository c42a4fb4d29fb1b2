use std::fmt::Debug;

use async_trait::async_trait;
use axum::http::{Extensions, HeaderMap};
use google_cloud_auth::credentials::{self, CacheableResource, Credentials};
use parking_lot::Mutex;
use tracing::info;

use rowgate_gateway::CollaboratorError;

use crate::config::GcpConfig;
use crate::error::ServerError;

/// Source of the authorization headers attached to Google API calls.
#[async_trait]
pub trait AuthHeaders: Send + Sync + Debug {
    async fn headers(&self) -> Result<HeaderMap, CollaboratorError>;
}

/// [`AuthHeaders`] backed by `google-cloud-auth` credentials.
///
/// Token fetching, caching and refresh live in the credentials object. The
/// last header set is kept only to answer a `NotModified` reply.
#[derive(Debug)]
pub struct CredentialsAuth {
    credentials: Credentials,
    last: Mutex<Option<HeaderMap>>,
}

impl CredentialsAuth {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            last: Mutex::new(None),
        }
    }

    /// Credentials for `config`: the service account key at
    /// `credentials_path` when set, Application Default Credentials
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the key cannot be read or parsed,
    /// or the credentials cannot be built.
    pub async fn from_config(config: &GcpConfig) -> Result<Self, ServerError> {
        let credentials = if let Some(path) = config.credentials_path.as_deref() {
            info!("loading GCP credentials from service account file");
            let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                ServerError::Config(format!("failed to read credentials file '{path}': {e}"))
            })?;
            let key: serde_json::Value = serde_json::from_str(&content)
                .map_err(|e| ServerError::Config(format!("invalid credentials JSON: {e}")))?;
            credentials::service_account::Builder::new(key)
                .build()
                .map_err(|e| {
                    ServerError::Config(format!(
                        "failed to build service account credentials: {e}"
                    ))
                })?
        } else {
            info!("using Application Default Credentials (ADC) for GCP");
            credentials::Builder::default().build().map_err(|e| {
                ServerError::Config(format!("failed to build default credentials: {e}"))
            })?
        };
        Ok(Self::new(credentials))
    }
}

#[async_trait]
impl AuthHeaders for CredentialsAuth {
    async fn headers(&self) -> Result<HeaderMap, CollaboratorError> {
        let resource = self
            .credentials
            .headers(Extensions::new())
            .await
            .map_err(|e| CollaboratorError::Lookup(format!("gcp credentials: {e}")))?;

        match resource {
            CacheableResource::New { data, .. } => {
                *self.last.lock() = Some(data.clone());
                Ok(data)
            }
            CacheableResource::NotModified => self.last.lock().clone().ok_or_else(|| {
                CollaboratorError::Lookup("gcp credentials: no cached headers".to_owned())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_file_is_a_config_error() {
        let config = GcpConfig {
            credentials_path: Some("/nonexistent/rowgate-sa.json".into()),
            ..GcpConfig::default()
        };
        let err = CredentialsAuth::from_config(&config).await.unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
        assert!(err.to_string().contains("failed to read credentials file"));
    }

    #[tokio::test]
    async fn malformed_key_file_is_a_config_error() {
        let path = std::env::temp_dir().join(format!("rowgate-sa-{}.json", std::process::id()));
        tokio::fs::write(&path, "{not json").await.unwrap();
        let config = GcpConfig {
            credentials_path: Some(path.display().to_string()),
            ..GcpConfig::default()
        };

        let err = CredentialsAuth::from_config(&config).await.unwrap_err();
        tokio::fs::remove_file(&path).await.unwrap();
        assert!(err.to_string().contains("invalid credentials JSON"));
    }
}
