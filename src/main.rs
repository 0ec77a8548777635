use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokenbroker::api::{create_token_router, TokenAppState};
use tokenbroker::config::BrokerConfig;
use tokenbroker::lifecycle::{run_refresh_sweep, LifecycleManager};
use tokenbroker::providers::build_registry;
use tokenbroker::seed::SeedTokens;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tokenbroker=info".into()),
        )
        .init();

    info!("Token broker starting...");

    let config = BrokerConfig::load().context("Failed to load configuration")?;
    info!(
        port = config.server.port,
        refresh_timeout_seconds = config.refresh.timeout_seconds,
        sweep_interval_seconds = config.refresh.sweep_interval_seconds,
        "Configuration loaded"
    );

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.refresh.timeout_seconds))
        .build()
        .context("Failed to build HTTP client")?;
    let registry = build_registry(&config.providers, http_client);
    info!(providers = ?registry.provider_ids(), "Provider registry built");

    let manager = Arc::new(
        LifecycleManager::new(registry)
            .with_refresh_timeout(Duration::from_secs(config.refresh.timeout_seconds)),
    );

    if let Some(seeds) = SeedTokens::from_env() {
        seeds.inject(&manager).await;
        manager.log_inventory();
    }

    let sweep_handle = if config.refresh.sweep_interval_seconds > 0 {
        info!(
            interval_seconds = config.refresh.sweep_interval_seconds,
            lead_seconds = config.refresh.sweep_lead_seconds,
            "Starting refresh sweep"
        );
        Some(tokio::spawn(run_refresh_sweep(
            Arc::clone(&manager),
            config.refresh.sweep_interval_seconds,
            config.refresh.sweep_lead_seconds,
        )))
    } else {
        None
    };

    // Start HTTP API server
    let router = create_token_router(TokenAppState {
        manager: Arc::clone(&manager),
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.port))
        .await
        .context("Failed to bind token API port")?;
    info!(port = config.server.port, "Token API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Token API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    if let Some(handle) = sweep_handle {
        handle.abort();
    }
    info!("Token broker stopped");

    Ok(())
}
