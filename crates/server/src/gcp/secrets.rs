use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::debug;

use rowgate_gateway::{CollaboratorError, SecretSource};

use super::auth::AuthHeaders;

/// Environment variable prefix read by [`EnvSecretSource::from_env`].
pub const SECRET_ENV_PREFIX: &str = "ROWGATE_SECRET_";

#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: Payload,
}

#[derive(Debug, Deserialize)]
struct Payload {
    data: String,
}

/// Reads the latest version of a secret from Secret Manager.
#[derive(Debug)]
pub struct SecretManagerSource {
    client: reqwest::Client,
    base_url: String,
    project: String,
    auth: Arc<dyn AuthHeaders>,
}

impl SecretManagerSource {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        project: impl Into<String>,
        auth: Arc<dyn AuthHeaders>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            project: project.into(),
            auth,
        }
    }

    fn access_url(&self, name: &str) -> String {
        format!(
            "{}/v1/projects/{}/secrets/{name}/versions/latest:access",
            self.base_url, self.project
        )
    }
}

#[async_trait]
impl SecretSource for SecretManagerSource {
    async fn get(&self, name: &str) -> Result<String, CollaboratorError> {
        let headers = self.auth.headers().await?;

        debug!(secret = name, "fetching secret");
        let response = self
            .client
            .get(self.access_url(name))
            .headers(headers)
            .send()
            .await
            .map_err(|e| CollaboratorError::Lookup(format!("secret {name}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Lookup(format!(
                "secret {name}: HTTP {status}: {body}"
            )));
        }

        let access: AccessResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Lookup(format!("secret {name}: {e}")))?;
        let bytes = STANDARD
            .decode(access.payload.data)
            .map_err(|e| CollaboratorError::Lookup(format!("secret {name}: bad payload: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| CollaboratorError::Lookup(format!("secret {name}: not utf-8: {e}")))
    }
}

/// Secrets taken from `ROWGATE_SECRET_<NAME>` variables, for running
/// outside Google Cloud.
///
/// `<NAME>` is the secret name upper-cased with `-` replaced by `_`, so
/// `api-key` is read from `ROWGATE_SECRET_API_KEY`.
#[derive(Debug, Default, Clone)]
pub struct EnvSecretSource {
    vars: HashMap<String, String>,
}

impl EnvSecretSource {
    /// Snapshot the current process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build from an explicit set of variables. Variables without the
    /// [`SECRET_ENV_PREFIX`] are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .filter_map(|(k, v)| {
                let key: String = k.into();
                key.strip_prefix(SECRET_ENV_PREFIX)
                    .map(|name| (name.to_owned(), v.into()))
            })
            .collect();
        Self { vars }
    }

    fn env_name(name: &str) -> String {
        name.to_uppercase().replace('-', "_")
    }
}

#[async_trait]
impl SecretSource for EnvSecretSource {
    async fn get(&self, name: &str) -> Result<String, CollaboratorError> {
        self.vars.get(&Self::env_name(name)).cloned().ok_or_else(|| {
            CollaboratorError::Lookup(format!(
                "secret {name}: {SECRET_ENV_PREFIX}{} is not set",
                Self::env_name(name)
            ))
        })
    }
}
