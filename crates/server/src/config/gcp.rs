use serde::Deserialize;

/// Google Cloud collaborators.
///
/// When `enabled` is `false` the server uses local stand-ins: secrets are
/// read from `ROWGATE_SECRET_<NAME>` environment variables, failures are
/// reported through `tracing`, and no service account is known.
///
/// # Example
///
/// ```toml
/// [gcp]
/// enabled = true
/// location = "europe-west1"
/// ```
#[derive(Debug, Deserialize)]
pub struct GcpConfig {
    /// Whether to talk to the metadata server and Google APIs.
    #[serde(default)]
    pub enabled: bool,
    /// Project id. Resolved from the metadata server when unset.
    pub project: Option<String>,
    /// Region the service runs in.
    pub location: Option<String>,
    /// Service account JSON key used to call Google APIs. Application
    /// Default Credentials are used when unset.
    pub credentials_path: Option<String>,
    /// Report unexpected failures to Cloud Error Reporting.
    #[serde(default = "default_true")]
    pub error_reporting: bool,
    /// Base URL of the instance metadata server.
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,
    /// Base URL of the Secret Manager API.
    #[serde(default = "default_secret_manager_url")]
    pub secret_manager_url: String,
    /// Base URL of the Error Reporting API.
    #[serde(default = "default_error_reporting_url")]
    pub error_reporting_url: String,
    /// HTTP timeout for every collaborator call, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            project: None,
            location: None,
            credentials_path: None,
            error_reporting: default_true(),
            metadata_url: default_metadata_url(),
            secret_manager_url: default_secret_manager_url(),
            error_reporting_url: default_error_reporting_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_metadata_url() -> String {
    "http://metadata.google.internal".to_owned()
}

fn default_secret_manager_url() -> String {
    "https://secretmanager.googleapis.com".to_owned()
}

fn default_error_reporting_url() -> String {
    "https://clouderrorreporting.googleapis.com".to_owned()
}

fn default_timeout() -> u64 {
    5
}
