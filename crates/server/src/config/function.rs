use serde::Deserialize;

/// The function fronted by this process.
///
/// # Example
///
/// ```toml
/// [function]
/// name = "dense_rank"
/// service_name = "Acme Functions"
/// ```
#[derive(Debug, Deserialize)]
pub struct FunctionConfig {
    /// Name used in logs, usage scope keys and quota messages.
    #[serde(default = "default_name")]
    pub name: String,
    /// Built-in computation to run. Defaults to `name`.
    pub builtin: Option<String>,
    /// Service name shown in quota error messages.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl FunctionConfig {
    /// The built-in computation this function runs.
    pub fn builtin_name(&self) -> &str {
        self.builtin.as_deref().unwrap_or(&self.name)
    }
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            builtin: None,
            service_name: default_service_name(),
        }
    }
}

fn default_name() -> String {
    "echo".to_owned()
}

fn default_service_name() -> String {
    rowgate_gateway::builder::DEFAULT_SERVICE_NAME.to_owned()
}
