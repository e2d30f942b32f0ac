use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quickconnect_backend::api;
use quickconnect_backend::config::Config;
use quickconnect_backend::credential::issuer_from_config;
use quickconnect_backend::mail::Mailer;
use quickconnect_backend::presence;
use quickconnect_backend::state::AppState;
use quickconnect_backend::store::{RoomStore, Stores};

const PRESENCE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env());
    if json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    tracing::info!("Starting QuickConnect Backend...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        host = %config.server_host,
        port = %config.server_port,
        storage = ?config.storage_backend,
        credential_mode = ?config.credential_mode,
        "Configuration loaded"
    );

    let stores = Stores::from_config(&config)?;

    // Test store connection
    match stores.rooms.health_check().await {
        Ok(true) => tracing::info!("Store connection established"),
        Ok(false) => tracing::warn!("Store health check returned false"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to store");
            // Continue anyway, might recover later
        }
    }

    let issuer = issuer_from_config(&config);
    if !issuer.is_configured() {
        // Joins fail per request until this is fixed
        tracing::error!("Video credential signer is not configured");
    }

    let mailer = Mailer::new_from_env();
    let request_timeout = Duration::from_secs(config.request_timeout_seconds);
    let addr: SocketAddr = config.server_addr().parse()?;
    let state = AppState::new(config, stores, issuer, mailer);

    tokio::spawn(presence::run_sweeper(
        state.presence.clone(),
        PRESENCE_SWEEP_INTERVAL,
    ));

    // Build router
    let app = api::create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Server listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Handle shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}
