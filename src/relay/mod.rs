// Relay service: client requests → backend commands

use crate::backend::{Command, SpatialBackend};
use crate::config::RelayConfig;
use crate::fanout::Fanout;
use crate::geo::Bounds;
use crate::identity::{is_valid_entity_id, redact, redact_feature, ConnectionId, IdentityRegistry};
use crate::places::PlaceCatalog;
use crate::session::{Feature, ServerMessage};
use crate::viewport::ViewportQueryEngine;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Features per `Update` message
pub const UPDATE_BATCH_SIZE: usize = 64;

/// `via` entry present on every relayed chat line
pub const VIA_NEARBY: &str = "nearby";

/// Handles everything a connection asks of the backend
pub struct Relay {
    backend: Arc<dyn SpatialBackend>,
    registry: Arc<IdentityRegistry>,
    fanout: Arc<dyn Fanout>,
    places: Arc<PlaceCatalog>,
    viewport: ViewportQueryEngine,
    collection: String,
    entity_ttl_seconds: u64,
    proximity_meters: f64,
}

impl Relay {
    pub fn new(
        backend: Arc<dyn SpatialBackend>,
        registry: Arc<IdentityRegistry>,
        fanout: Arc<dyn Fanout>,
        places: Arc<PlaceCatalog>,
        config: &RelayConfig,
    ) -> Self {
        let viewport = ViewportQueryEngine::new(
            Arc::clone(&backend),
            Arc::clone(&registry),
            config.backend.collection.clone(),
            &config.viewport,
        );
        Self {
            backend,
            registry,
            fanout,
            places,
            viewport,
            collection: config.backend.collection.clone(),
            entity_ttl_seconds: config.backend.entity_ttl_seconds,
            proximity_meters: config.proximity.distance_meters,
        }
    }

    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    /// Bind the connection to the feature's entity and store its position.
    ///
    /// Returns the bound entity id, or `None` when the id is malformed.
    /// A failed write is logged; the binding stands.
    pub async fn update_location(&self, connection: ConnectionId, feature: &Feature) -> Option<String> {
        if !is_valid_entity_id(&feature.id) {
            debug!(connection = %connection, "Ignoring feature with malformed id");
            return None;
        }
        self.registry.bind(connection, &feature.id);

        let command = Command::set_object(
            &self.collection,
            &feature.id,
            self.entity_ttl_seconds,
            &feature.to_geojson().to_string(),
        );
        if let Err(e) = self.backend.command(&command).await {
            warn!(entity = %redact(&feature.id), error = %e, "Failed to store location");
        }
        Some(feature.id.clone())
    }

    /// Refresh the viewport fence, then send what is inside `bounds`.
    ///
    /// Returns whether the fence was declared.
    pub async fn update_viewport(&self, connection: ConnectionId, bounds: Bounds) -> bool {
        let declared = match self.viewport.watch(connection, &bounds).await {
            Ok(()) => true,
            Err(e) => {
                warn!(connection = %connection, error = %e, "Failed to declare viewport channel");
                false
            }
        };

        let mut batches = self
            .viewport
            .query(connection, bounds)
            .chunks(UPDATE_BATCH_SIZE);
        while let Some(features) = batches.next().await {
            self.deliver(connection, &ServerMessage::Update { features })
                .await;
        }
        declared
    }

    /// Deliver a chat line to every connection whose entity is nearby.
    ///
    /// `via` always holds "nearby", plus every place containing both the
    /// sender and the recipient.
    pub async fn relay_message(&self, connection: ConnectionId, feature: &Feature, text: &str) {
        let Some((lat, lng)) = feature.position() else {
            debug!(connection = %connection, "Ignoring message without a point position");
            return;
        };
        let sender = self
            .registry
            .entity_for(connection)
            .unwrap_or_else(|| feature.id.clone());

        let nearby = self
            .collect_ids(|cursor| {
                Command::nearby_ids(&self.collection, cursor, lat, lng, self.proximity_meters)
            })
            .await;
        let mut via: HashMap<String, Vec<String>> = nearby
            .into_iter()
            .map(|id| (id, vec![VIA_NEARBY.to_string()]))
            .collect();
        if via.is_empty() {
            return;
        }

        for place in self.places.iter() {
            let geometry = place.geometry_json();
            let inside: HashSet<String> = self
                .collect_ids(|cursor| Command::intersects_ids_object(&self.collection, cursor, &geometry))
                .await
                .into_iter()
                .collect();
            if !inside.contains(&sender) {
                continue;
            }
            for (recipient, reasons) in via.iter_mut() {
                if inside.contains(recipient) {
                    reasons.push(place.name.clone());
                }
            }
        }

        let feature = redact_feature(feature.to_geojson());
        for (recipient, reasons) in via {
            let Some(target) = self.registry.connection_for(&recipient) else {
                continue;
            };
            let message = ServerMessage::Message {
                feature: feature.clone(),
                text: text.to_string(),
                via: reasons,
            };
            self.send(target, &message);
        }
    }

    /// Send the connection its own public id.
    ///
    /// Returns false, sending nothing, while the connection is unbound.
    pub fn send_identity(&self, connection: ConnectionId) -> bool {
        let Some(entity) = self.registry.entity_for(connection) else {
            return false;
        };
        self.send(connection, &ServerMessage::Id { id: redact(&entity) });
        true
    }

    /// Send each configured place as its own `Feature` message
    pub fn send_places(&self, connection: ConnectionId) {
        for place in self.places.iter() {
            self.fanout
                .send_to(connection, &place.to_feature().to_string());
        }
    }

    /// Release the connection's entity and viewport channel
    pub async fn close(&self, connection: ConnectionId, viewport_declared: bool) {
        if let Some(entity) = self.registry.unbind(connection) {
            if let Err(e) = self.backend.command(&Command::del(&self.collection, &entity)).await {
                warn!(entity = %redact(&entity), error = %e, "Failed to delete entity");
            }
        }
        if viewport_declared {
            if let Err(e) = self.viewport.release(connection).await {
                warn!(connection = %connection, error = %e, "Failed to delete viewport channel");
            }
        }
    }

    /// Every id across the pages of an IDS search
    async fn collect_ids(&self, search: impl Fn(i64) -> Command) -> Vec<String> {
        let mut ids = Vec::new();
        let mut cursor = 0;
        loop {
            let page = match self.backend.command(&search(cursor)).await.map(|r| r.into_page()) {
                Ok(Ok(Some(page))) => page,
                Ok(Ok(None)) => break,
                Ok(Err(e)) | Err(e) => {
                    warn!(cursor, error = %e, "Search aborted");
                    break;
                }
            };
            ids.extend(page.items.iter().filter_map(|item| item.as_text()).map(str::to_string));
            if page.cursor == 0 {
                break;
            }
            cursor = page.cursor;
        }
        ids
    }

    fn send(&self, connection: ConnectionId, message: &ServerMessage) {
        match message.to_json() {
            Ok(json) => self.fanout.send_to(connection, &json),
            Err(e) => warn!(error = %e, "Failed to serialize message"),
        }
    }

    /// Like `send`, but waits for room in the connection's queue
    async fn deliver(&self, connection: ConnectionId, message: &ServerMessage) {
        match message.to_json() {
            Ok(json) => self.fanout.deliver(connection, json).await,
            Err(e) => warn!(error = %e, "Failed to serialize message"),
        }
    }
}
