//! Process-wide runtime context and the collaborators it fronts.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, error};

use crate::error::CollaboratorError;

/// Source of named secrets.
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn get(&self, name: &str) -> Result<String, CollaboratorError>;
}

/// Source of the identity the process runs as.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn service_account(&self) -> Result<String, CollaboratorError>;
}

/// Sink for unexpected failures. Reporting is best-effort.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, report: ErrorReport);
}

/// One unexpected failure as handed to an [`ErrorReporter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub function: String,
    pub request_id: String,
    pub user: String,
    pub caller: String,
    /// `Kind: message` as returned to the caller.
    pub message: String,
    /// Message plus detail, truncated.
    pub detail: String,
}

/// Reports failures as `tracing` errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

#[async_trait]
impl ErrorReporter for TracingErrorReporter {
    async fn report(&self, report: ErrorReport) {
        error!(
            function = %report.function,
            request_id = %report.request_id,
            user = %report.user,
            detail = %report.detail,
            "{}",
            report.message
        );
    }
}

/// State shared by every request of the process.
///
/// Secrets are fetched on first use and cached for the process lifetime;
/// the service account is resolved at most once.
pub struct RuntimeContext {
    project: Option<String>,
    location: Option<String>,
    secrets: Option<Arc<dyn SecretSource>>,
    identity: Option<Arc<dyn IdentitySource>>,
    secret_cache: DashMap<String, String>,
    service_account: OnceCell<String>,
}

impl RuntimeContext {
    /// Context with no collaborators.
    #[must_use]
    pub fn new(project: Option<String>, location: Option<String>) -> Self {
        Self {
            project,
            location,
            secrets: None,
            identity: None,
            secret_cache: DashMap::new(),
            service_account: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_secret_source(mut self, source: Arc<dyn SecretSource>) -> Self {
        self.secrets = Some(source);
        self
    }

    #[must_use]
    pub fn with_identity_source(mut self, source: Arc<dyn IdentitySource>) -> Self {
        self.identity = Some(source);
        self
    }

    /// Project the process is deployed in.
    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// Region the process is deployed in.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Fetch a secret, serving repeat lookups from the cache.
    pub async fn secret(&self, name: &str) -> Result<String, CollaboratorError> {
        if let Some(cached) = self.secret_cache.get(name) {
            return Ok(cached.value().clone());
        }
        let source = self
            .secrets
            .as_ref()
            .ok_or(CollaboratorError::NotConfigured("secret source"))?;
        let value = source.get(name).await?;
        debug!(secret = name, "secret cached");
        // Concurrent first lookups may both fetch; the first insert wins.
        Ok(self
            .secret_cache
            .entry(name.to_owned())
            .or_insert(value)
            .value()
            .clone())
    }

    /// The identity the process runs as, resolved once.
    pub async fn service_account(&self) -> Result<String, CollaboratorError> {
        let source = self
            .identity
            .as_ref()
            .ok_or(CollaboratorError::NotConfigured("identity source"))?;
        self.service_account
            .get_or_try_init(|| source.service_account())
            .await
            .cloned()
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("project", &self.project)
            .field("location", &self.location)
            .field("cached_secrets", &self.secret_cache.len())
            .finish_non_exhaustive()
    }
}
