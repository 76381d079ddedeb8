//! Load generator: simulated map clients for the geofence relay.
//!
//! Each client starts at a random point near the origin, walks in a straight
//! line, and reports its position and viewport on fixed intervals. A dropped
//! connection is retried after a second.

mod geo;

use anyhow::{Context, Result};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use geo::destination_point;
use rand::Rng;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

const GPS_INTERVAL: Duration = Duration::from_secs(1);
const VIEWPORT_INTERVAL: Duration = Duration::from_millis(500);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Width and height of the reported viewport
const VIEWPORT_METERS: f64 = 4_000.0;
/// Maximum start distance from the origin
const SPREAD_METERS: f64 = 1_500.0;
const SPEED_METERS_PER_SECOND: f64 = 2.5;

#[derive(Debug, Parser)]
#[command(name = "loadgen", about = "Simulated clients for the geofence relay")]
struct Args {
    /// Relay address
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    addr: String,

    /// Number of clients
    #[arg(short = 'n', long, default_value_t = 100)]
    clients: usize,

    /// Origin as a GeoJSON [lng, lat] pair
    #[arg(short, long, default_value = "[-104.99649808,39.74254437]")]
    coords: String,

    /// WebSocket path on the relay
    #[arg(long, default_value = "/ws")]
    path: String,
}

/// One simulated entity
struct SimClient {
    idx: usize,
    id: String,
    color: String,
    start: (f64, f64),
    bearing: f64,
    started: Instant,
    stagger: Duration,
}

impl SimClient {
    fn new(idx: usize, origin: (f64, f64), rng: &mut impl Rng) -> Self {
        let id_bytes: [u8; 12] = rng.gen();
        let color = format!(
            "#{:02x}{:02x}{:02x}",
            rng.gen_range(127..255u8),
            rng.gen_range(95..223u8),
            rng.gen_range(75..203u8),
        );
        let start = destination_point(
            origin.0,
            origin.1,
            rng.gen::<f64>() * SPREAD_METERS,
            rng.gen::<f64>() * 360.0,
        );
        Self {
            idx,
            id: hex::encode(id_bytes),
            color,
            start,
            bearing: rng.gen::<f64>() * 360.0,
            started: Instant::now(),
            stagger: Duration::from_millis(rng.gen_range(0..2_000)),
        }
    }

    /// Current (lat, lng) along the walk
    fn position(&self) -> (f64, f64) {
        let walked = SPEED_METERS_PER_SECOND * self.started.elapsed().as_secs_f64();
        destination_point(self.start.0, self.start.1, walked, self.bearing)
    }

    fn feature_message(&self) -> String {
        let (lat, lng) = self.position();
        json!({
            "type": "Feature",
            "id": self.id,
            "geometry": {"type": "Point", "coordinates": [lng, lat]},
            "properties": {"color": self.color},
        })
        .to_string()
    }

    fn viewport_message(&self) -> String {
        let (lat, lng) = self.position();
        let half = VIEWPORT_METERS / 2.0;
        let (north, _) = destination_point(lat, lng, half, 0.0);
        let (_, east) = destination_point(lat, lng, half, 90.0);
        let (south, _) = destination_point(lat, lng, half, 180.0);
        let (_, west) = destination_point(lat, lng, half, 270.0);
        json!({
            "type": "Viewport",
            "bounds": {
                "_sw": {"lat": south, "lng": west},
                "_ne": {"lat": north, "lng": east},
            },
        })
        .to_string()
    }
}

/// Parse a `[lng, lat]` pair into (lat, lng)
fn parse_origin(coords: &str) -> Result<(f64, f64)> {
    let [lng, lat]: [f64; 2] =
        serde_json::from_str(coords).with_context(|| format!("Invalid coordinates '{}'", coords))?;
    Ok((lat, lng))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loadgen=info".into()),
        )
        .init();

    let args = Args::parse();
    let origin = parse_origin(&args.coords)?;
    let url = format!("ws://{}{}", args.addr, args.path);

    info!(clients = args.clients, url = %url, "Firing up clients");

    {
        let mut rng = rand::thread_rng();
        for idx in 0..args.clients {
            let client = SimClient::new(idx, origin, &mut rng);
            tokio::spawn(run_client(client, url.clone()));
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");
    Ok(())
}

async fn run_client(client: SimClient, url: String) {
    tokio::time::sleep(client.stagger).await;
    loop {
        match session(&client, &url).await {
            Ok(()) => info!(client = client.idx, "Disconnected"),
            Err(e) => warn!(client = client.idx, error = %format!("{:#}", e), "Session failed"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// One connection lifetime; returns when the relay closes it
async fn session(client: &SimClient, url: &str) -> Result<()> {
    let (socket, _) = connect_async(url).await.context("Failed to connect")?;
    info!(client = client.idx, "Connected");

    let (mut write, mut read) = socket.split();
    let mut gps = tokio::time::interval(GPS_INTERVAL);
    let mut viewport = tokio::time::interval(VIEWPORT_INTERVAL);

    loop {
        tokio::select! {
            _ = gps.tick() => {
                write.send(Message::Text(client.feature_message())).await?;
            }
            _ = viewport.tick() => {
                write.send(Message::Text(client.viewport_message())).await?;
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::Value;

    #[test]
    fn test_parse_origin_swaps_order() {
        assert_eq!(parse_origin("[-104.5,39.75]").unwrap(), (39.75, -104.5));
        assert!(parse_origin("[1.0]").is_err());
        assert!(parse_origin("denver").is_err());
    }

    #[test]
    fn test_client_id_is_24_hex_chars() {
        let mut rng = StdRng::seed_from_u64(7);
        let client = SimClient::new(0, (39.74, -104.99), &mut rng);
        assert_eq!(client.id.len(), 24);
        assert!(client.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(client.color.len(), 7);
    }

    #[test]
    fn test_messages_match_relay_protocol() {
        let mut rng = StdRng::seed_from_u64(11);
        let client = SimClient::new(3, (39.74, -104.99), &mut rng);

        let feature: Value = serde_json::from_str(&client.feature_message()).unwrap();
        assert_eq!(feature["type"], "Feature");
        assert_eq!(feature["id"], Value::String(client.id.clone()));
        assert_eq!(feature["geometry"]["coordinates"].as_array().unwrap().len(), 2);

        let viewport: Value = serde_json::from_str(&client.viewport_message()).unwrap();
        let sw = &viewport["bounds"]["_sw"];
        let ne = &viewport["bounds"]["_ne"];
        assert!(sw["lat"].as_f64().unwrap() < ne["lat"].as_f64().unwrap());
        assert!(sw["lng"].as_f64().unwrap() < ne["lng"].as_f64().unwrap());
    }
}
