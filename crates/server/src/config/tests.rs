use rowgate_core::UsageBackendKind;

use super::*;

#[test]
fn empty_config_uses_defaults() {
    let config = RowgateConfig::parse("").unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.shutdown_timeout_seconds, 10);
    assert_eq!(config.function.name, "echo");
    assert_eq!(config.function.builtin_name(), "echo");
    assert_eq!(config.function.service_name, "Rowgate");
    assert_eq!(config.quotas.backend, UsageBackendKind::None);
    assert!(config.quotas.max_rows_per_query.is_none());
    assert!(config.usage.url.is_none());
    assert!(!config.gcp.enabled);
    assert!(!config.telemetry.enabled);
}

#[test]
fn full_config() {
    let toml = r#"
        [server]
        host = "127.0.0.1"
        port = 9000

        [function]
        name = "rank_scores"
        builtin = "dense_rank"
        service_name = "Acme Functions"

        [quotas]
        max_rows_per_query = 100
        max_rows_per_user_per_day = 10000
        backend = "datastore"
        contact = "data@acme.io"

        [usage]
        url = "postgres://localhost/rowgate"
        prefix = "fn_"
        pool_size = 4
        ssl_mode = "require"

        [gcp]
        enabled = true
        project = "acme"
        location = "europe-west1"
        error_reporting = false
    "#;

    let config = RowgateConfig::parse(toml).unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.function.name, "rank_scores");
    assert_eq!(config.function.builtin_name(), "dense_rank");
    assert_eq!(config.function.service_name, "Acme Functions");
    assert_eq!(config.quotas.max_rows_per_query, Some(100));
    assert_eq!(config.quotas.max_rows_per_user_per_day, Some(10_000));
    assert_eq!(config.quotas.backend, UsageBackendKind::Postgres);
    assert_eq!(config.quotas.contact_or_default(), "data@acme.io");
    assert_eq!(config.usage.url.as_deref(), Some("postgres://localhost/rowgate"));
    assert_eq!(config.usage.prefix.as_deref(), Some("fn_"));
    assert_eq!(config.usage.pool_size, Some(4));
    assert_eq!(config.usage.ssl_mode.as_deref(), Some("require"));
    assert!(config.gcp.enabled);
    assert_eq!(config.gcp.project.as_deref(), Some("acme"));
    assert!(!config.gcp.error_reporting);
    assert_eq!(config.gcp.metadata_url, "http://metadata.google.internal");
}

#[test]
fn unknown_backend_is_rejected() {
    let err = RowgateConfig::parse("[quotas]\nbackend = \"firestore\"").unwrap_err();
    assert!(err.to_string().contains("configuration error"));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let config = RowgateConfig::load("/nonexistent/rowgate.toml").unwrap();
    assert_eq!(config.function.name, "echo");
}

#[test]
fn telemetry_defaults() {
    let config: TelemetryConfig = toml::from_str("").unwrap();
    assert!(!config.enabled);
    assert_eq!(config.log_format, LogFormat::Text);
    assert_eq!(config.endpoint, "http://localhost:4317");
    assert_eq!(config.service_name, "rowgate");
    assert!((config.sample_ratio - 1.0).abs() < f64::EPSILON);
    assert_eq!(config.protocol, "grpc");
    assert_eq!(config.timeout_seconds, 10);
    assert!(config.resource_attributes.is_empty());
}

#[test]
fn telemetry_custom_config() {
    let toml = r#"
        log_format = "json"
        enabled = true
        endpoint = "http://collector:4317"
        sample_ratio = 0.5
        protocol = "http"

        [resource_attributes]
        "deployment.environment" = "staging"
    "#;

    let config: TelemetryConfig = toml::from_str(toml).unwrap();
    assert_eq!(config.log_format, LogFormat::Json);
    assert!(config.enabled);
    assert_eq!(config.endpoint, "http://collector:4317");
    assert!((config.sample_ratio - 0.5).abs() < f64::EPSILON);
    assert_eq!(config.protocol, "http");
    assert_eq!(
        config.resource_attributes.get("deployment.environment").unwrap(),
        "staging"
    );
}

#[test]
fn gcp_defaults_point_at_google() {
    let config: GcpConfig = toml::from_str("").unwrap();
    assert!(!config.enabled);
    assert!(config.error_reporting);
    assert!(config.credentials_path.is_none());
    assert_eq!(config.secret_manager_url, "https://secretmanager.googleapis.com");
    assert_eq!(
        config.error_reporting_url,
        "https://clouderrorreporting.googleapis.com"
    );
    assert_eq!(config.timeout_seconds, 5);
}
