use crate::backend::BackendEvent;
use crate::identity::ConnectionId;
use crate::places::PlaceCatalog;
use crate::router::RouterConfig;
use crate::viewport::ViewportQueryEngine;
use serde_json::Value;

/// Which side of the roaming distance a counterpart is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proximity {
    Nearby,
    Faraway,
}

/// A backend event, classified by the channel it arrived on
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Roaming fence: `counterpart` came within (or left) range of `actor`
    Proximity {
        actor: String,
        proximity: Proximity,
        counterpart: Value,
    },
    /// An entity left the viewport of `connection`
    ViewportExit {
        connection: ConnectionId,
        event: Value,
    },
    /// Any set/del in the collection
    World { actor: String, event: Value },
    /// An entity entered or exited a static place
    Place { place: String, event: Value },
    Unknown {
        channel: String,
        reason: &'static str,
    },
}

enum ChannelKind {
    Roam,
    World,
    Place(String),
    Viewport(ConnectionId),
}

impl ChannelKind {
    fn parse(channel: &str, config: &RouterConfig) -> Option<Self> {
        if channel == config.roam_channel {
            Some(Self::Roam)
        } else if config.world_broadcast && channel == config.world_channel {
            Some(Self::World)
        } else if let Some(name) = PlaceCatalog::name_from_channel(channel) {
            Some(Self::Place(name.to_string()))
        } else {
            ViewportQueryEngine::parse_channel(channel).map(Self::Viewport)
        }
    }
}

impl Notification {
    pub fn classify(event: &BackendEvent, config: &RouterConfig) -> Self {
        let unknown = |reason| Notification::Unknown {
            channel: event.channel.clone(),
            reason,
        };

        let Some(kind) = ChannelKind::parse(&event.channel, config) else {
            return unknown("unrecognized channel");
        };
        let payload: Value = match serde_json::from_str(&event.payload) {
            Ok(value @ Value::Object(_)) => value,
            _ => return unknown("malformed payload"),
        };

        match kind {
            ChannelKind::Roam => {
                let Some(actor) = payload.get("id").and_then(Value::as_str) else {
                    return unknown("roam event without actor");
                };
                let side = |key: &str| payload.get(key).and_then(|side| side.get("object"));
                let (proximity, counterpart) = if let Some(object) = side("nearby") {
                    (Proximity::Nearby, object)
                } else if let Some(object) = side("faraway") {
                    (Proximity::Faraway, object)
                } else {
                    return unknown("roam event without counterpart");
                };
                Notification::Proximity {
                    actor: actor.to_string(),
                    proximity,
                    counterpart: counterpart.clone(),
                }
            }
            ChannelKind::Viewport(connection) => Notification::ViewportExit {
                connection,
                event: payload,
            },
            ChannelKind::World => Notification::World {
                actor: payload
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                event: payload,
            },
            ChannelKind::Place(place) => Notification::Place {
                place,
                event: payload,
            },
        }
    }
}
