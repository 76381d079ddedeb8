// Viewport queries and per-connection viewport fences

use crate::backend::{BackendError, Command, SpatialBackend};
use crate::geo::Bounds;
use crate::identity::{redact_feature, ConnectionId, IdentityRegistry};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Backend channel prefix for per-connection viewport fences
pub const VIEWPORT_CHANNEL_PREFIX: &str = "viewport:";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Expiry of a viewport channel; refreshed by every Viewport message
    pub channel_ttl_seconds: u64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            channel_ttl_seconds: 30,
        }
    }
}

/// Answers "which entities are inside these bounds" for one connection
pub struct ViewportQueryEngine {
    backend: Arc<dyn SpatialBackend>,
    registry: Arc<IdentityRegistry>,
    collection: String,
    channel_ttl_seconds: u64,
}

impl ViewportQueryEngine {
    pub fn new(
        backend: Arc<dyn SpatialBackend>,
        registry: Arc<IdentityRegistry>,
        collection: impl Into<String>,
        config: &ViewportConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            collection: collection.into(),
            channel_ttl_seconds: config.channel_ttl_seconds,
        }
    }

    pub fn channel_name(connection: ConnectionId) -> String {
        format!("{}{}", VIEWPORT_CHANNEL_PREFIX, connection)
    }

    pub fn parse_channel(channel: &str) -> Option<ConnectionId> {
        channel.strip_prefix(VIEWPORT_CHANNEL_PREFIX)?.parse().ok()
    }

    pub fn channel_pattern() -> String {
        format!("{}*", VIEWPORT_CHANNEL_PREFIX)
    }

    /// Redacted features inside `bounds`, excluding the requester's own entity.
    ///
    /// Pages are fetched lazily. A failing page ends the stream; features
    /// already yielded stand.
    pub fn query(&self, connection: ConnectionId, bounds: Bounds) -> BoxStream<'static, Value> {
        let backend = Arc::clone(&self.backend);
        let registry = Arc::clone(&self.registry);
        let collection = self.collection.clone();

        stream::unfold(Some(0), move |cursor| {
            let backend = Arc::clone(&backend);
            let registry = Arc::clone(&registry);
            let collection = collection.clone();
            async move {
                let cursor = cursor?;
                fetch_page(backend.as_ref(), &registry, &collection, connection, &bounds, cursor)
                    .await
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }

    /// Declare (or refresh) the connection's viewport exit fence
    pub async fn watch(&self, connection: ConnectionId, bounds: &Bounds) -> Result<(), BackendError> {
        let command = Command::setchan_viewport(
            &Self::channel_name(connection),
            self.channel_ttl_seconds,
            &self.collection,
            bounds,
        );
        self.backend.command(&command).await.map(|_| ())
    }

    pub async fn release(&self, connection: ConnectionId) -> Result<(), BackendError> {
        let command = Command::delchan(&Self::channel_name(connection));
        self.backend.command(&command).await.map(|_| ())
    }
}

/// One page of features plus the cursor to continue from
async fn fetch_page(
    backend: &dyn SpatialBackend,
    registry: &IdentityRegistry,
    collection: &str,
    connection: ConnectionId,
    bounds: &Bounds,
    cursor: i64,
) -> Option<(Vec<Value>, Option<i64>)> {
    let command = Command::intersects_bounds(collection, cursor, bounds);
    let page = match backend.command(&command).await.map(|reply| reply.into_page()) {
        Ok(Ok(Some(page))) => page,
        Ok(Ok(None)) => return None,
        Ok(Err(e)) | Err(e) => {
            warn!(connection = %connection, cursor, error = %e, "Viewport query aborted");
            return None;
        }
    };

    // Compare raw ids before anything is redacted
    let own_entity = registry.entity_for(connection);
    let mut features = Vec::with_capacity(page.items.len());
    for item in &page.items {
        let Some([id, object, ..]) = item.as_array() else {
            continue;
        };
        let (Some(id), Some(object)) = (id.as_text(), object.as_text()) else {
            continue;
        };
        if own_entity.as_deref() == Some(id) {
            continue;
        }
        match serde_json::from_str::<Value>(object) {
            Ok(feature) => features.push(redact_feature(feature)),
            Err(e) => debug!(error = %e, "Skipping unparsable backend object"),
        }
    }

    let next = (page.cursor != 0).then_some(page.cursor);
    Some((features, next))
}
