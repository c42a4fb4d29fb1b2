use async_trait::async_trait;

use rowgate_gateway::{CollaboratorError, IdentitySource};

/// Client for the instance metadata server. Only used for the project id
/// and the service account email; API credentials come from
/// [`CredentialsAuth`](super::CredentialsAuth).
#[derive(Debug)]
pub struct MetadataClient {
    client: reqwest::Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/computeMetadata/v1/{path}", self.base_url)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, CollaboratorError> {
        let response = self
            .client
            .get(self.url(path))
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| CollaboratorError::Lookup(format!("metadata {path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Lookup(format!(
                "metadata {path}: HTTP {status}"
            )));
        }
        Ok(response)
    }

    async fn get_text(&self, path: &str) -> Result<String, CollaboratorError> {
        self.get(path)
            .await?
            .text()
            .await
            .map(|s| s.trim().to_owned())
            .map_err(|e| CollaboratorError::Lookup(format!("metadata {path}: {e}")))
    }

    /// Id of the project the instance runs in.
    pub async fn project_id(&self) -> Result<String, CollaboratorError> {
        self.get_text("project/project-id").await
    }

    /// Email of the default service account.
    pub async fn service_account_email(&self) -> Result<String, CollaboratorError> {
        self.get_text("instance/service-accounts/default/email")
            .await
    }
}

#[async_trait]
impl IdentitySource for MetadataClient {
    async fn service_account(&self) -> Result<String, CollaboratorError> {
        self.service_account_email().await
    }
}
