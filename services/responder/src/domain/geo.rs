use serde::{Deserialize, Serialize};

/// WGS-84 point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// One ranked facility near an incident; recomputed per alert, never stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyFacility {
    pub name: String,
    /// Raw amenity kind, e.g. `fire_station`
    pub category: String,
    pub category_label: String,
    pub coordinates: Coordinates,
    /// Great-circle distance in km, rounded to 0.1
    pub distance_km: f64,
}

/// Incident location plus the facilities ranked by distance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedIncident {
    pub coordinates: Coordinates,
    pub display_name: String,
    /// May be empty; that is a valid outcome
    pub facilities: Vec<NearbyFacility>,
}

/// Outcome of resolving free-text location
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(ResolvedIncident),
    /// Geocoding miss; not an error
    NotFound,
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn facilities(&self) -> &[NearbyFacility] {
        match self {
            Self::Found(incident) => &incident.facilities,
            Self::NotFound => &[],
        }
    }
}
