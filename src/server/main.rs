use std::str::FromStr;
use std::sync::Arc;

use licensegate::config::{get_config, LoggingConfig};
use licensegate::engine::{EngineSettings, LicenseEngine};
use licensegate::errors::{LicenseError, LicenseResult};
use licensegate::server::bootstrap::{ensure_license, parse_command, run_bootstrap, ServerCommand};
use licensegate::server::{build_router, AppState};
use licensegate::storage::Storage;
use tracing::{error, info, warn, Level};

fn init_tracing(logging: &LoggingConfig) {
    if !logging.enabled {
        return;
    }
    let level = Level::from_str(&logging.level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received, draining connections");
}

async fn run() -> LicenseResult<()> {
    let config = get_config()?;
    init_tracing(&config.logging);

    let storage = Storage::connect(&config.storage).await?;
    let engine = Arc::new(LicenseEngine::new(
        storage,
        EngineSettings::from(&config.license),
    ));

    let args: Vec<String> = std::env::args().collect();
    if let ServerCommand::InitLicense { key, max_accounts } = parse_command(&args) {
        let key = key
            .or_else(|| config.bootstrap.license_key.clone())
            .ok_or_else(|| {
                LicenseError::ConfigError(
                    "init-license needs --key or bootstrap.license_key".to_string(),
                )
            })?;
        let max_accounts = max_accounts.unwrap_or(config.bootstrap.max_accounts);
        let outcome = ensure_license(&*engine, &key, max_accounts).await?;
        info!(license_key = %outcome.license().key, "init-license finished");
        return Ok(());
    }

    run_bootstrap(&*engine, &config.bootstrap).await?;

    if config.admin.secret.is_empty() {
        warn!("No admin secret configured; admin routes are disabled");
    }

    let state = AppState::new(engine, &config.admin.secret);
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LicenseError::ConfigError(format!("failed to bind {addr}: {e}")))?;

    info!("Licensegate server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| LicenseError::ConfigError(format!("server error: {e}")))?;

    info!("Server stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("licensegate_server: {e}");
        std::process::exit(1);
    }
}
