//! es-monitor: an HTTP endpoint for Elasticsearch health checks.
//!
//! This is the application entry point. It parses arguments, loads
//! configuration, initializes tracing, restricts the credential file,
//! sets up the Axum router and starts the HTTP server.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use es_monitor::config::{AppConfig, DEFAULT_LOG_FILTER};
use es_monitor::{create_router, credentials, http, AppState};

/// es-monitor: run Elasticsearch health checks over HTTP
#[derive(Parser, Debug)]
#[command(name = "es-monitor", version, about)]
struct Args {
    /// Path to configuration file (defaults to config/es-monitor.toml if present)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level filter (e.g., "es_monitor=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Listening port, overrides config and PORT
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration: file, then environment, then CLI
    let mut config = AppConfig::resolve(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.http.port = port;
    }

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let json = config.logging.is_json();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_filter))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!(
        port = config.http.port,
        executable = %config.probe.executable.display(),
        timeout_secs = config.probe.timeout_seconds,
        max_concurrent = config.governor.max_concurrent,
        queue_timeout_ms = config.governor.queue_timeout_millis,
        "Starting Elasticsearch monitoring server"
    );

    // Must happen before the first probe can run
    credentials::prepare(config.credentials.path.as_deref());

    let http_config = config.http.clone();
    let state = AppState::new(config);
    let app = create_router(state);

    http::start_server(app, &http_config).await?;

    Ok(())
}
