use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Backend channel prefix for static place fences
pub const PLACE_CHANNEL_PREFIX: &str = "place:";

/// A static named polygon whose enter/exit events are broadcast
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Place {
    pub name: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// GeoJSON geometry (usually a Polygon)
    pub geometry: Value,
}

impl Place {
    pub fn channel(&self) -> String {
        format!("{}{}", PLACE_CHANNEL_PREFIX, self.name)
    }

    pub fn geometry_json(&self) -> String {
        self.geometry.to_string()
    }

    /// Configured properties, with `name` filled in when absent
    pub fn properties(&self) -> Map<String, Value> {
        let mut properties = self.properties.clone();
        properties
            .entry("name")
            .or_insert_with(|| Value::String(self.name.clone()));
        properties
    }

    /// GeoJSON Feature announced to clients; `properties.id` names the layer
    pub fn to_feature(&self) -> Value {
        let mut properties = self.properties();
        properties.insert("id".to_string(), Value::String(self.name.clone()));
        json!({
            "type": "Feature",
            "id": self.name,
            "geometry": self.geometry,
            "properties": properties,
        })
    }
}

/// Lookup table of configured places
#[derive(Debug, Clone, Default)]
pub struct PlaceCatalog {
    places: Vec<Place>,
}

impl PlaceCatalog {
    pub fn new(places: Vec<Place>) -> Self {
        Self { places }
    }

    pub fn get(&self, name: &str) -> Option<&Place> {
        self.places.iter().find(|p| p.name == name)
    }

    /// Place name encoded in a backend channel, if it is a place channel
    pub fn name_from_channel(channel: &str) -> Option<&str> {
        channel
            .strip_prefix(PLACE_CHANNEL_PREFIX)
            .filter(|name| !name.is_empty())
    }

    pub fn channel_pattern() -> String {
        format!("{}*", PLACE_CHANNEL_PREFIX)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Place> {
        self.places.iter()
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(name: &str, properties: Value) -> Place {
        Place {
            name: name.to_string(),
            properties: properties.as_object().cloned().unwrap_or_default(),
            geometry: json!({"type": "Polygon", "coordinates": []}),
        }
    }

    #[test]
    fn test_properties_fill_in_name() {
        let plaza = place("plaza", json!({"color": "gold"}));
        let properties = plaza.properties();
        assert_eq!(properties["name"], "plaza");
        assert_eq!(properties["color"], "gold");
    }

    #[test]
    fn test_configured_name_property_wins() {
        let plaza = place("plaza", json!({"name": "Town Plaza"}));
        assert_eq!(plaza.properties()["name"], "Town Plaza");
    }

    #[test]
    fn test_to_feature() {
        let feature = place("park", json!({})).to_feature();
        assert_eq!(feature["type"], "Feature");
        assert_eq!(feature["id"], "park");
        assert_eq!(feature["properties"]["name"], "park");
        assert_eq!(feature["properties"]["id"], "park");
        assert_eq!(feature["geometry"]["type"], "Polygon");
    }

    #[test]
    fn test_channel_names() {
        let park = place("park", json!({}));
        assert_eq!(park.channel(), "place:park");
        assert_eq!(PlaceCatalog::name_from_channel("place:park"), Some("park"));
        assert_eq!(PlaceCatalog::name_from_channel("place:"), None);
        assert_eq!(PlaceCatalog::name_from_channel("roamchan"), None);
        assert_eq!(PlaceCatalog::channel_pattern(), "place:*");
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = PlaceCatalog::new(vec![place("park", json!({})), place("plaza", json!({}))]);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("plaza").is_some());
        assert!(catalog.get("mall").is_none());
    }
}
