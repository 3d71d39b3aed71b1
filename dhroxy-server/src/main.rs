//! dhroxy server entry point

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dhroxy_server::{
    AppState, FHIR_BASE, build_router, config::ServerConfig, upstream::HttpUpstreamClient,
};

#[tokio::main]
async fn main() {
    // Load configuration before logging so log.level can seed the filter
    let loaded = ServerConfig::load(
        std::path::Path::new("config.yaml")
            .exists()
            .then_some("config.yaml"),
    );
    let config = loaded.as_ref().cloned().unwrap_or_else(|_| {
        let mut config = ServerConfig::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    });

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .init();

    if let Err(e) = &loaded {
        tracing::warn!("Failed to load config, using defaults: {}", e);
    }

    tracing::info!("Starting dhroxy...");

    let upstream_url = config.labsvar_url();
    let upstream = HttpUpstreamClient::new(
        upstream_url.clone(),
        Duration::from_secs(config.upstream.connect_timeout_secs),
        Duration::from_secs(config.upstream.request_timeout_secs),
    )
    .unwrap_or_else(|e| {
        tracing::error!("Failed to build upstream client: {}", e);
        std::process::exit(1);
    });

    tracing::info!(
        url = %upstream_url,
        layout = config.mapping.columns.version,
        "Upstream: labsvar"
    );

    let bind_addr = config.bind_addr();
    let state = AppState::new(config, Arc::new(upstream));

    // Build router
    let app = build_router(state);

    // Bind TCP listener
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Listening on http://{}{}", bind_addr, FHIR_BASE);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Server error: {}", e);
        });

    tracing::info!("Server shut down gracefully");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
