mod function;
mod gcp;
mod server;
mod telemetry;
mod usage;

#[cfg(test)]
mod tests;

pub use function::*;
pub use gcp::*;
pub use server::*;
pub use telemetry::*;
pub use usage::*;

use std::path::Path;

use serde::Deserialize;

use rowgate_core::QuotaConfig;

use crate::error::ServerError;

/// Top-level configuration for the Rowgate server, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct RowgateConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// The function this process fronts.
    #[serde(default)]
    pub function: FunctionConfig,
    /// Quota limits and backend selection.
    #[serde(default)]
    pub quotas: QuotaConfig,
    /// Connection settings for the usage store backend.
    #[serde(default)]
    pub usage: UsageConfig,
    /// Logging and OpenTelemetry tracing configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Google Cloud collaborators (metadata, secrets, error reporting).
    #[serde(default)]
    pub gcp: GcpConfig,
}

impl RowgateConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self, ServerError> {
        toml::from_str(contents).map_err(|e| ServerError::Config(e.to_string()))
    }
}
