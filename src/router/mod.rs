//! Notification router: backend fences → WebSocket connections.
//!
//! Declares the relay's backend channels, subscribes to them and routes
//! every published event to the connections it concerns. A failed
//! subscription is retried forever after a fixed delay.

mod notification;

pub use notification::{Notification, Proximity};

use crate::backend::{BackendEvent, Command, SpatialBackend, Topic};
use crate::fanout::Fanout;
use crate::identity::{redact_event, redact_feature, ConnectionId, IdentityRegistry};
use crate::places::PlaceCatalog;
use crate::session::ServerMessage;
use crate::viewport::ViewportQueryEngine;
use anyhow::{Context, Result};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Router configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Roaming fence channel
    pub roam_channel: String,
    /// Whole-collection set/del channel
    pub world_channel: String,
    /// Broadcast every set/del to every connection
    pub world_broadcast: bool,
    pub retry_delay_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            roam_channel: "roamchan".to_string(),
            world_channel: "world".to_string(),
            world_broadcast: true,
            retry_delay_ms: 1_000,
        }
    }
}

impl RouterConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Subscription lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Disconnected,
    Subscribing,
    Active,
    Failed,
}

/// Routes backend notifications to connections
pub struct NotificationRouter {
    backend: Arc<dyn SpatialBackend>,
    registry: Arc<IdentityRegistry>,
    fanout: Arc<dyn Fanout>,
    places: Arc<PlaceCatalog>,
    collection: String,
    proximity_meters: f64,
    config: RouterConfig,
    state: watch::Sender<RouterState>,
    attempts: AtomicU64,
}

impl NotificationRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn SpatialBackend>,
        registry: Arc<IdentityRegistry>,
        fanout: Arc<dyn Fanout>,
        places: Arc<PlaceCatalog>,
        collection: impl Into<String>,
        proximity_meters: f64,
        config: RouterConfig,
    ) -> Self {
        let (state, _) = watch::channel(RouterState::Disconnected);
        Self {
            backend,
            registry,
            fanout,
            places,
            collection: collection.into(),
            proximity_meters,
            config,
            state,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> RouterState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RouterState> {
        self.state.subscribe()
    }

    /// Subscription attempts so far, including the current one
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Run the router forever.
    pub async fn run(self: Arc<Self>) {
        let delay = self.config.retry_delay();
        info!(
            channel = %self.config.roam_channel,
            places = self.places.len(),
            "Starting notification router"
        );

        loop {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            self.transition(RouterState::Subscribing);

            match self.run_attempt().await {
                Ok(()) => warn!(attempt, "Notification subscription ended"),
                Err(e) => warn!(attempt, error = %format!("{:#}", e), "Notification subscription failed"),
            }

            self.transition(RouterState::Failed);
            tokio::time::sleep(delay).await;
        }
    }

    /// One subscription lifetime: declare, subscribe, route until the stream breaks
    async fn run_attempt(&self) -> Result<()> {
        self.declare_channels().await?;

        let mut events = self
            .backend
            .subscribe(&self.topics())
            .await
            .context("Failed to subscribe")?;
        self.transition(RouterState::Active);

        while let Some(event) = events.next().await {
            let event = event.context("Subscription receive failed")?;
            self.handle_event(&event);
        }
        Ok(())
    }

    /// Declare every channel the router listens on.
    ///
    /// Runs on every subscription attempt so a restarted backend gets its
    /// fences back.
    pub async fn declare_channels(&self) -> Result<()> {
        let roam = Command::setchan_roam(
            &self.config.roam_channel,
            &self.collection,
            self.proximity_meters,
        );
        self.declare(&self.config.roam_channel, &roam).await?;

        if self.config.world_broadcast {
            let world = Command::setchan_world(&self.config.world_channel, &self.collection);
            self.declare(&self.config.world_channel, &world).await?;
        }

        for place in self.places.iter() {
            let channel = place.channel();
            let fence = Command::setchan_place(&channel, &self.collection, &place.geometry_json());
            self.declare(&channel, &fence).await?;
        }
        Ok(())
    }

    async fn declare(&self, channel: &str, command: &Command) -> Result<()> {
        self.backend
            .command(command)
            .await
            .with_context(|| format!("Failed to declare channel '{}'", channel))?;
        debug!(channel = %channel, "Channel declared");
        Ok(())
    }

    pub fn topics(&self) -> Vec<Topic> {
        let mut topics = vec![Topic::Channel(self.config.roam_channel.clone())];
        if self.config.world_broadcast {
            topics.push(Topic::Channel(self.config.world_channel.clone()));
        }
        if !self.places.is_empty() {
            topics.push(Topic::Pattern(PlaceCatalog::channel_pattern()));
        }
        topics.push(Topic::Pattern(ViewportQueryEngine::channel_pattern()));
        topics
    }

    pub fn handle_event(&self, event: &BackendEvent) {
        let notification = Notification::classify(event, &self.config);
        self.dispatch(notification);
    }

    pub fn dispatch(&self, notification: Notification) {
        match notification {
            Notification::Proximity {
                actor,
                proximity,
                counterpart,
            } => {
                let Some(connection) = self.registry.connection_for(&actor) else {
                    debug!("Roaming actor has no live connection");
                    return;
                };
                let feature = redact_feature(counterpart);
                let message = match proximity {
                    Proximity::Nearby => ServerMessage::Nearby { feature },
                    Proximity::Faraway => ServerMessage::Faraway { feature },
                };
                self.send(connection, &message);
            }
            Notification::ViewportExit { connection, event } => {
                self.fanout
                    .send_to(connection, &redact_event(event).to_string());
            }
            Notification::World { actor, event } => {
                // Resolve the author from the raw id before redaction
                let author = self.registry.connection_for(&actor);
                self.fanout
                    .broadcast(&redact_event(event).to_string(), author);
            }
            Notification::Place { place, mut event } => {
                match self.places.get(&place) {
                    Some(configured) => merge_properties(&mut event, configured.properties()),
                    None => debug!(place = %place, "Event for unconfigured place"),
                }
                self.fanout
                    .broadcast(&redact_event(event).to_string(), None);
            }
            Notification::Unknown { channel, reason } => {
                warn!(channel = %channel, reason, "Dropping notification");
            }
        }
    }

    fn send(&self, connection: ConnectionId, message: &ServerMessage) {
        match message.to_json() {
            Ok(json) => self.fanout.send_to(connection, &json),
            Err(e) => warn!(error = %e, "Failed to serialize notification"),
        }
    }

    fn transition(&self, next: RouterState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = ?previous, to = ?next, "Notification router state changed");
        }
    }
}

/// Overlay `properties` onto the event's `properties` object
fn merge_properties(event: &mut Value, properties: Map<String, Value>) {
    let Some(event) = event.as_object_mut() else {
        return;
    };
    let target = event
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(existing) = target {
        existing.extend(properties);
    } else {
        *target = Value::Object(properties);
    }
}
