//! Wire models of backend replies that have no domain counterpart

use serde::{Deserialize, Serialize};

/// `{ "error": "..." }` body on a rejected request
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// `POST /register` success body
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterReply {
    pub center: crate::domain::Facility,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeocodeRequest<'a> {
    pub location: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodedLocation {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub display_name: String,
}

/// One entry of `emergency_services`
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodedService {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub type_label: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub distance_km: Option<f64>,
}

/// `POST /geocode` reply
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeReply {
    #[serde(default)]
    pub found: bool,
    #[serde(default)]
    pub location: Option<GeocodedLocation>,
    #[serde(default)]
    pub emergency_services: Vec<GeocodedService>,
    #[serde(default)]
    pub error: Option<String>,
}
