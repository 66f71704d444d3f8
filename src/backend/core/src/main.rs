//! Tollgate Server - Main entry point
//!
//! Serves a CSRF-protected demo application with health and metrics endpoints.

use std::sync::Arc;

use clap::Parser;
use tollgate_core::{
    api::{self, AppState, CONTEXT_KEY},
    config::Config,
    csrf::{CsrfConfig, CsrfGuard},
    telemetry,
};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "tollgate-server", version, about = "Double-submit cookie CSRF protection server")]
struct Args {
    /// Configuration file (TOML, YAML or JSON); environment variables override it
    #[arg(short, long, env = "TOLLGATE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: Could not load config: {}. Using defaults.", e);
            Config::default()
        }),
    };

    let metrics = telemetry::init_telemetry(&config.telemetry)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Tollgate Server"
    );

    let store = api::build_store(&config.storage).await?;

    let mut csrf = CsrfConfig::from_settings(&config.csrf);
    csrf.storage = Some(store);
    if csrf.context_key.is_none() {
        csrf.context_key = Some(CONTEXT_KEY.to_string());
    }
    let guard = Arc::new(CsrfGuard::new(csrf)?);

    let app = api::build_router(AppState { guard, metrics });

    let addr = config.bind_address();
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
