use serde::{Deserialize, Serialize};

/// A WGS84 coordinate as sent by map clients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Rectangular region given by its south-west and north-east corners
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(rename = "_sw")]
    pub south_west: LatLng,
    #[serde(rename = "_ne")]
    pub north_east: LatLng,
}

impl Bounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Corners in backend BOUNDS order: minlat minlng maxlat maxlng
    pub fn to_args(&self) -> [f64; 4] {
        [
            self.south_west.lat,
            self.south_west.lng,
            self.north_east.lat,
            self.north_east.lng,
        ]
    }

    /// The whole globe
    pub fn world() -> Self {
        Self::new(
            LatLng {
                lat: -90.0,
                lng: -180.0,
            },
            LatLng {
                lat: 90.0,
                lng: 180.0,
            },
        )
    }
}
