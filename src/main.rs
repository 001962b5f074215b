//! Multi-camera streamer
//!
//! Main entry point.

use multicam_streamer::{
    decoder,
    record_provider::RecordProvider,
    state::{AppConfig, AppState},
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "multicam_streamer=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting multicam-streamer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!(
        database = config.database_url.is_some(),
        inventory_file = %config.inventory_file.display(),
        decoder = %config.decoder_program,
        geometry = %format!("{}x{}@{}", config.frame_width, config.frame_height, config.frame_fps),
        max_pipelines = config.max_pipelines,
        "Configuration loaded"
    );

    match decoder::check_decoder(&config.decoder_program).await {
        Ok(version) => tracing::info!(version = %version, "Decoder available"),
        Err(e) => tracing::warn!(error = %e, "Decoder check failed - streams will not start"),
    }

    // Record provider
    let records = match &config.database_url {
        Some(url) => {
            let pool = MySqlPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(5))
                .connect(url)
                .await?;
            tracing::info!("Database connected");
            RecordProvider::database(pool)
        }
        None => RecordProvider::from_file(&config.inventory_file).await?,
    };
    let records = Arc::new(records);

    let state = AppState::build(config, records);
    tracing::info!("StreamSupervisor initialized");

    // Garbage-collect pipelines that stopped on their own
    let supervisor_sweep = state.supervisor.clone();
    let sweep_interval = state.config.sweep_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            let removed = supervisor_sweep.sweep().await;
            if removed > 0 {
                tracing::info!(removed = removed, "Swept stopped pipelines");
            }
        }
    });

    // Reachability report
    if !state.config.probe_interval.is_zero() {
        let reachability = state.reachability.clone();
        let probe_interval = state.config.probe_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(probe_interval);
            loop {
                interval.tick().await;
                if let Err(e) = reachability.run_once().await {
                    tracing::error!(error = %e, "Reachability probe failed");
                }
            }
        });
        tracing::info!(interval_sec = probe_interval.as_secs(), "ReachabilityProbe started");
    }

    // Start system health monitoring
    let health_monitor = state.system_health.clone();
    tokio::spawn(async move {
        use sysinfo::System;
        let mut sys = System::new_all();
        let mut interval = tokio::time::interval(Duration::from_secs(30));

        loop {
            interval.tick().await;
            sys.refresh_all();

            // Calculate average CPU usage across all cores
            let cpu = {
                let cpus = sys.cpus();
                if cpus.is_empty() {
                    0.0
                } else {
                    cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
                }
            };
            let memory = if sys.total_memory() > 0 {
                (sys.used_memory() as f32 / sys.total_memory() as f32) * 100.0
            } else {
                0.0
            };

            let mut health = health_monitor.write().await;
            health.update(cpu, memory);
        }
    });

    let app = web_api::create_router(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    // Pipelines stop before the server drains: closing the frame buffers
    // ends every open viewer response.
    let supervisor = state.supervisor.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            supervisor.shutdown_all().await;
        })
        .await?;

    // Anything started while the listener was draining
    state.supervisor.shutdown_all().await;
    tracing::info!("All pipelines stopped, exiting");

    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping streams");
}
