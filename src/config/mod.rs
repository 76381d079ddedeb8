use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

// Re-export section types owned by their modules
pub use crate::backend::BackendConfig;
pub use crate::places::Place;
pub use crate::router::RouterConfig;
pub use crate::viewport::ViewportConfig;

/// Complete relay configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub proximity: ProximityConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
    /// Static geofences announced to clients
    #[serde(default)]
    pub places: Vec<Place>,
}

/// HTTP/WebSocket listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    /// Per-connection outbound queue length
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Log outbound message counts and rate
    #[serde(default)]
    pub metrics: bool,
    #[serde(default = "default_metrics_interval_seconds")]
    pub metrics_interval_seconds: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_outbound_buffer() -> usize {
    crate::fanout::CONNECTION_BUFFER_SIZE
}

fn default_metrics_interval_seconds() -> u64 {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            ws_path: default_ws_path(),
            outbound_buffer: default_outbound_buffer(),
            metrics: false,
            metrics_interval_seconds: default_metrics_interval_seconds(),
        }
    }
}

/// Roaming and chat distance
#[derive(Debug, Clone, Deserialize)]
pub struct ProximityConfig {
    #[serde(default = "default_distance_meters")]
    pub distance_meters: f64,
}

fn default_distance_meters() -> f64 {
    1000.0
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            distance_meters: default_distance_meters(),
        }
    }
}

impl RelayConfig {
    /// Apply RELAY_* / TILE38_URL environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RELAY_LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Ok(v) = std::env::var("RELAY_METRICS") {
            self.server.metrics = matches!(v.as_str(), "1" | "true");
        }
        if let Ok(v) = std::env::var("TILE38_URL") {
            self.backend.url = v;
        }
        if let Ok(v) = std::env::var("RELAY_PROXIMITY_METERS") {
            match v.parse::<f64>() {
                Ok(meters) if meters > 0.0 => self.proximity.distance_meters = meters,
                _ => warn!(value = %v, "Ignoring invalid RELAY_PROXIMITY_METERS"),
            }
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &str) -> Result<RelayConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path))?;
    parse_config(&contents).with_context(|| format!("Invalid config file '{}'", path))
}

/// Parse configuration from TOML text
pub fn parse_config(contents: &str) -> Result<RelayConfig> {
    let config: RelayConfig = toml::from_str(contents)?;
    for place in &config.places {
        anyhow::ensure!(!place.name.is_empty(), "place with empty name");
        anyhow::ensure!(
            place.geometry.is_object(),
            "place '{}' has no geometry object",
            place.name
        );
    }
    Ok(config)
}
