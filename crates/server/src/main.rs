use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use rowgate_server::api::{AppState, router};
use rowgate_server::bootstrap::build_dispatcher;
use rowgate_server::config::RowgateConfig;
use rowgate_server::usage_factory::create_usage_store;

/// HTTP server fronting a quota-enforced batch function.
#[derive(Parser, Debug)]
#[command(name = "rowgate-server", about = "Quota-enforcing remote function server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "rowgate.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port. Falls back to the `PORT` environment
    /// variable, then to the config file.
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the usage store schema for the configured backend, then exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = RowgateConfig::load(&cli.config)?;

    if let Some(Commands::Migrate) = cli.command {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
        return run_migrate(&config).await;
    }

    let telemetry_guard = rowgate_server::telemetry::init(&config.telemetry);

    if !std::path::Path::new(&cli.config).exists() {
        info!(path = %cli.config, "config file not found, using defaults");
    }

    let dispatcher = Arc::new(build_dispatcher(&config).await?);
    let app = router(AppState {
        dispatcher: Arc::clone(&dispatcher),
    });

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli
        .port
        .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
        .unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, function = %dispatcher.function(), "rowgate-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    if tokio::time::timeout(shutdown_timeout, dispatcher.shutdown())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = config.server.shutdown_timeout_seconds,
            "shutdown timeout exceeded, some error reports may be lost"
        );
    }

    telemetry_guard.shutdown();

    info!("rowgate-server shut down");
    Ok(())
}

async fn run_migrate(config: &RowgateConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !config.quotas.backend.is_persistent() {
        info!("quota backend is none, nothing to migrate");
        return Ok(());
    }
    // Creating the store runs any pending migrations.
    create_usage_store(&config.quotas, &config.usage).await?;
    info!(backend = %config.quotas.backend, "usage store migrated");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
