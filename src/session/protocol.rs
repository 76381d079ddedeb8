pub use crate::geo::Bounds;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A GeoJSON feature describing an entity
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Feature {
    /// Persistent entity id chosen by the client
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub geometry: Value,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Serialize back to a GeoJSON Feature object
    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "Feature",
            "id": self.id,
            "geometry": self.geometry,
            "properties": self.properties,
        })
    }

    /// Point position as (lat, lng); GeoJSON stores [lng, lat]
    pub fn position(&self) -> Option<(f64, f64)> {
        let coordinates = self.geometry.get("coordinates")?.as_array()?;
        let lng = coordinates.first()?.as_f64()?;
        let lat = coordinates.get(1)?.as_f64()?;
        Some((lat, lng))
    }
}

/// Client → Server message types
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Location update; binds the connection to the feature's id
    Feature(Feature),
    /// Region of interest
    Viewport { bounds: Bounds },
    /// Chat line for everyone nearby
    Message {
        feature: Feature,
        #[serde(default)]
        text: String,
    },
    /// Request for the connection's own public id
    #[serde(rename = "ID")]
    Id,
    /// Request for the static place geofences
    Places,
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Server → Client message types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "ID")]
    Id { id: String },
    /// Entities currently inside the connection's viewport
    Update { features: Vec<Value> },
    Nearby { feature: Value },
    Faraway { feature: Value },
    /// Relayed chat line; `via` names the geofences linking sender and recipient
    Message {
        feature: Value,
        text: String,
        via: Vec<String>,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
