//! Google Cloud collaborators: metadata server, Secret Manager and Error
//! Reporting, plus local stand-ins used when `[gcp] enabled = false`.
//! Google API calls are authorized through `google-cloud-auth` credentials.

mod auth;
mod error_reporting;
mod metadata;
mod secrets;

pub use auth::{AuthHeaders, CredentialsAuth};
pub use error_reporting::CloudErrorReporter;
pub use metadata::MetadataClient;
pub use secrets::{EnvSecretSource, SECRET_ENV_PREFIX, SecretManagerSource};

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use rowgate_gateway::{ErrorReporter, RuntimeContext, TracingErrorReporter};

use crate::config::GcpConfig;
use crate::error::ServerError;

/// The runtime context and error reporter handed to the dispatcher.
pub struct Collaborators {
    pub context: RuntimeContext,
    pub reporter: Arc<dyn ErrorReporter>,
}

/// Wire up collaborators for `config`.
///
/// With GCP enabled the project id is taken from the config or, failing
/// that, resolved from the metadata server, so startup fails if neither is
/// available. `service` names the reporting service in Error Reporting.
pub async fn collaborators(config: &GcpConfig, service: &str) -> Result<Collaborators, ServerError> {
    if !config.enabled {
        let context = RuntimeContext::new(config.project.clone(), config.location.clone())
            .with_secret_source(Arc::new(EnvSecretSource::from_env()));
        return Ok(Collaborators {
            context,
            reporter: Arc::new(TracingErrorReporter),
        });
    }

    let auth = Arc::new(CredentialsAuth::from_config(config).await?);
    collaborators_with_auth(config, service, auth).await
}

/// Like [`collaborators`] for an enabled config, with the Google API
/// credentials supplied by the caller.
pub async fn collaborators_with_auth(
    config: &GcpConfig,
    service: &str,
    auth: Arc<dyn AuthHeaders>,
) -> Result<Collaborators, ServerError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()
        .map_err(|e| ServerError::Config(format!("failed to build http client: {e}")))?;
    let metadata = Arc::new(MetadataClient::new(client.clone(), &config.metadata_url));

    let project = match config.project.clone() {
        Some(project) => project,
        None => metadata.project_id().await?,
    };
    info!(project = %project, "gcp collaborators enabled");

    let secrets = SecretManagerSource::new(
        client.clone(),
        &config.secret_manager_url,
        project.clone(),
        Arc::clone(&auth),
    );
    let reporter: Arc<dyn ErrorReporter> = if config.error_reporting {
        Arc::new(CloudErrorReporter::new(
            client,
            &config.error_reporting_url,
            project.clone(),
            service,
            auth,
        ))
    } else {
        Arc::new(TracingErrorReporter)
    };

    let context = RuntimeContext::new(Some(project), config.location.clone())
        .with_secret_source(Arc::new(secrets))
        .with_identity_source(metadata);

    Ok(Collaborators { context, reporter })
}
