//! ocean-rs-mutator - Deployment resource request webhook
//!
//! This binary serves the mutating admission endpoint over TLS and a
//! plain-HTTP health/metrics API next to it.

use anyhow::{Context, Result};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use mutator_lib::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    webhook_router, OceanClient, WebhookState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const MUTATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Time in-flight admissions get to finish on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting ocean-rs-mutator");

    let config = config::MutatorConfig::load()?;
    let cluster = config.spotinst.cluster_identity();
    info!(
        cluster_id = %cluster,
        base_url = %config.spotinst.base_url,
        listen_addr = %config.listen_addr,
        "Mutator configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::WEBHOOK).await;
    health_registry.register(components::SUGGESTION_BACKEND).await;

    let provider = OceanClient::new(config.spotinst.ocean_config())
        .context("Failed to create Ocean API client")?;

    let tls_config =
        RustlsConfig::from_pem_file(&config.tls_cert_file, &config.tls_private_key_file)
            .await
            .with_context(|| {
                format!(
                    "Failed to load TLS key pair from {} and {}",
                    config.tls_cert_file.display(),
                    config.tls_private_key_file.display()
                )
            })?;

    let logger = StructuredLogger::new(cluster.as_str());
    let state = Arc::new(WebhookState::new(
        Arc::new(provider),
        cluster,
        health_registry.clone(),
    ));

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let api_port = config.api_port;
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, app_state).await {
            error!(error = %e, "Health/metrics server failed");
        }
    });

    let handle = Handle::new();
    let shutdown_logger = logger.clone();
    let shutdown_handle = handle.clone();
    let shutdown_registry = health_registry.clone();
    tokio::spawn(async move {
        let reason = shutdown_signal().await;
        shutdown_logger.log_shutdown(reason);
        shutdown_registry.set_ready(false).await;
        shutdown_registry
            .set_unhealthy(components::WEBHOOK, format!("draining after {reason}"))
            .await;
        shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    health_registry.set_healthy(components::WEBHOOK).await;
    health_registry.set_ready(true).await;
    logger.log_startup(MUTATOR_VERSION, &config.listen_addr.to_string());

    let served = axum_server::bind_rustls(config.listen_addr, tls_config)
        .handle(handle)
        .serve(webhook_router(state).into_make_service())
        .await;

    health_registry.set_ready(false).await;
    if let Err(e) = &served {
        health_registry
            .set_unhealthy(components::WEBHOOK, format!("listener failed: {e}"))
            .await;
    }
    api_handle.abort();
    served.context("Webhook server failed")?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
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
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT received",
        _ = terminate => "SIGTERM received",
    }
}
