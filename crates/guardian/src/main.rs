//! Guardian - fleet coordination server
//!
//! This binary runs the central coordinator: it tracks node liveness,
//! detects anomalies in reported metrics, drives bounded remediation, and
//! activates mirrors when nodes fail.

use anyhow::Result;
use guardian_lib::{
    auth::PermissiveVerifier,
    coordinator::MirrorCoordinator,
    detector::{AnomalyDetector, DetectorConfig},
    engine::{EngineConfig, Guardian},
    fabric::ConnectionFabric,
    health::{components, HealthRegistry},
    observability::{GuardianMetrics, StructuredLogger},
    persistence::Persistence,
    registry::NodeRegistry,
    remediation::{RemediationEngine, RetryPolicy},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const GUARDIAN_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting guardian");

    // Load configuration
    let config = config::GuardianConfig::load()?;
    info!(guardian_id = %config.guardian_id, "Guardian configured");

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::REGISTRY).await;
    health_registry.register(components::DETECTOR).await;
    health_registry.register(components::FABRIC).await;
    health_registry.register(components::REMEDIATION).await;
    health_registry.register(components::COORDINATOR).await;
    health_registry.register(components::PERSISTENCE).await;

    // Initialize metrics and structured logger
    let metrics = GuardianMetrics::new();
    let logger = StructuredLogger::new(&config.guardian_id);
    logger.log_startup(GUARDIAN_VERSION);

    // Wire the engine. No external stores configured: degraded in-memory
    // persistence, flagged on the health endpoint.
    let persistence = Persistence::disabled();
    health_registry
        .set_degraded(components::PERSISTENCE, "No external store configured")
        .await;

    let node_registry = Arc::new(NodeRegistry::new());
    let detector = Arc::new(AnomalyDetector::new(DetectorConfig::default()));
    let fabric = Arc::new(ConnectionFabric::new());
    let remediation = Arc::new(RemediationEngine::new(
        node_registry.clone(),
        fabric.clone(),
        persistence.clone(),
        RetryPolicy::default(),
    ));
    let coordinator = Arc::new(MirrorCoordinator::new(
        node_registry.clone(),
        fabric.clone(),
        persistence.clone(),
    ));

    let engine_config = EngineConfig {
        heartbeat_timeout_secs: config.heartbeat_timeout_secs,
        sweep_interval: Duration::from_secs(config.sweep_interval_secs),
        cleanup_interval: Duration::from_secs(config.cleanup_interval_secs),
    };
    let guardian = Arc::new(Guardian::new(
        node_registry,
        detector,
        fabric,
        remediation,
        coordinator,
        persistence,
        Arc::new(PermissiveVerifier),
        engine_config,
    ));

    // Background loops share one shutdown channel
    let (shutdown_tx, _) = broadcast::channel(1);
    let sweep_handle = tokio::spawn(guardian.clone().run_sweep_loop(shutdown_tx.subscribe()));
    let cleanup_handle = tokio::spawn(guardian.clone().run_cleanup_loop(shutdown_tx.subscribe()));

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        guardian,
    ));

    // Mark guardian as ready after initialization
    health_registry.set_ready(true).await;

    // Start health/metrics/fleet server
    let _api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    let _ = shutdown_tx.send(());
    let _ = sweep_handle.await;
    let _ = cleanup_handle.await;

    Ok(())
}
