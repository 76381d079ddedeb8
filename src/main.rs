use anyhow::{Context, Result};
use clap::Parser;
use geofence_relay::api::{create_ws_router, WsAppState};
use geofence_relay::backend::{SpatialBackend, Tile38Client};
use geofence_relay::config::{load_config, RelayConfig};
use geofence_relay::fanout::{run_metrics_reporter, ConnectionHub, Fanout};
use geofence_relay::identity::IdentityRegistry;
use geofence_relay::places::PlaceCatalog;
use geofence_relay::relay::Relay;
use geofence_relay::router::NotificationRouter;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Presence and geofence notification relay in front of Tile38
#[derive(Debug, Parser)]
#[command(name = "geofence-relay", version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<String>,

    /// Log outbound message counts and rate
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geofence_relay=info".into()),
        )
        .init();

    let args = Args::parse();

    info!("Geofence relay starting...");

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    config.apply_env_overrides();
    if args.metrics {
        config.server.metrics = true;
    }

    info!(
        listen_addr = %config.server.listen_addr,
        backend = %config.backend.url,
        collection = %config.backend.collection,
        proximity_meters = config.proximity.distance_meters,
        places = config.places.len(),
        "Configuration loaded"
    );

    let backend: Arc<dyn SpatialBackend> = Arc::new(
        Tile38Client::new(&config.backend).context("Failed to create Tile38 client")?,
    );
    let registry = Arc::new(IdentityRegistry::new());
    let hub = Arc::new(ConnectionHub::new(config.server.outbound_buffer));
    let places = Arc::new(PlaceCatalog::new(config.places.clone()));

    let metrics_handle = config.server.metrics.then(|| {
        let period = Duration::from_secs(config.server.metrics_interval_seconds.max(1));
        tokio::spawn(run_metrics_reporter(hub.metrics(), period))
    });

    // Notification router runs for the life of the process
    let router = Arc::new(NotificationRouter::new(
        Arc::clone(&backend),
        Arc::clone(&registry),
        Arc::clone(&hub) as Arc<dyn Fanout>,
        Arc::clone(&places),
        config.backend.collection.clone(),
        config.proximity.distance_meters,
        config.router.clone(),
    ));
    let router_handle = tokio::spawn(Arc::clone(&router).run());

    let relay = Arc::new(Relay::new(
        backend,
        registry,
        Arc::clone(&hub) as Arc<dyn Fanout>,
        places,
        &config,
    ));
    let app = create_ws_router(
        Arc::new(WsAppState {
            relay,
            hub: Arc::clone(&hub),
        }),
        &config.server.ws_path,
    );

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen_addr))?;
    info!(
        addr = %config.server.listen_addr,
        path = %config.server.ws_path,
        "WebSocket server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("WebSocket server error")?;

    router_handle.abort();
    if let Some(handle) = metrics_handle {
        handle.abort();
    }
    info!(connections = hub.len(), "Geofence relay stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl_c signal");
        return;
    }
    info!("Shutdown signal received");
}
