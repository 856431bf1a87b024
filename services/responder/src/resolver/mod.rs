//! Geospatial facility resolver
//!
//! Turns the free-text location of an incident into coordinates and a list of
//! nearby emergency facilities ordered by great-circle distance. Lookups never
//! fail hard: geocoding misses become [`Resolution::NotFound`] and a failing
//! radius search yields an empty list.

pub mod direct;
pub mod remote;

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use errors::ResponderResult;

use crate::backend::HttpBackend;
use crate::config::{ResolverConfig, ResolverMode};
use crate::domain::{title_case, Coordinates, NearbyFacility, Resolution};

pub use direct::{GeoResolver, NominatimGeocoder, OverpassSearch};
pub use remote::BackendResolver;

/// Mean Earth radius used for haversine distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[async_trait]
pub trait IncidentResolver: Send + Sync {
    async fn resolve(&self, location_text: &str) -> Resolution;
}

/// Facility found by a radius search, before ranking
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub category: String,
    pub coordinates: Coordinates,
}

/// Great-circle distance in km, rounded to one decimal
pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lon = (to.lon - from.lon).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    (EARTH_RADIUS_KM * c * 10.0).round() / 10.0
}

pub fn category_label(category: &str) -> String {
    match category {
        "hospital" => "Hospital".to_string(),
        "clinic" | "doctors" => "Clinic".to_string(),
        "police" => "Police Station".to_string(),
        "fire_station" => "Fire Station".to_string(),
        other => title_case(other),
    }
}

/// Order by distance, then name, then category, keeping the closest `limit`
pub fn rank(origin: Coordinates, candidates: Vec<Candidate>, limit: usize) -> Vec<NearbyFacility> {
    let mut ranked: Vec<NearbyFacility> = candidates
        .into_iter()
        .filter(|c| !c.name.trim().is_empty())
        .map(|c| NearbyFacility {
            distance_km: haversine_km(origin, c.coordinates),
            category_label: category_label(&c.category),
            name: c.name,
            category: c.category,
            coordinates: c.coordinates,
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.category.cmp(&b.category))
    });
    ranked.truncate(limit);
    ranked
}

/// Build the resolver selected by `resolver.mode`
pub fn build_resolver(
    config: &ResolverConfig,
    backend: Arc<HttpBackend>,
) -> ResponderResult<Arc<dyn IncidentResolver>> {
    Ok(match config.mode {
        ResolverMode::Backend => Arc::new(BackendResolver::new(backend, config.max_results)),
        ResolverMode::Direct => Arc::new(GeoResolver::new(
            NominatimGeocoder::new(config)?,
            OverpassSearch::new(config)?,
            config.max_results,
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, category: &str, lat: f64, lon: f64) -> Candidate {
        Candidate {
            name: name.into(),
            category: category.into(),
            coordinates: Coordinates::new(lat, lon),
        }
    }

    #[test]
    fn test_haversine_known_distance() {
        let mumbai = Coordinates::new(19.0760, 72.8777);
        let pune = Coordinates::new(18.5204, 73.8567);
        let d = haversine_km(mumbai, pune);
        assert_eq!(d, 120.2);
        assert_eq!(haversine_km(mumbai, mumbai), 0.0);
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(category_label("doctors"), "Clinic");
        assert_eq!(category_label("fire_station"), "Fire Station");
        assert_eq!(category_label("police"), "Police Station");
        assert_eq!(category_label("ambulance_station"), "Ambulance Station");
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let origin = Coordinates::new(19.0, 72.8);
        let candidates = vec![
            candidate("Far Hospital", "hospital", 19.04, 72.8),
            candidate("Near Police", "police", 19.001, 72.8),
            candidate("", "clinic", 19.0, 72.8),
            candidate("Mid Fire", "fire_station", 19.02, 72.8),
        ];

        let ranked = rank(origin, candidates.clone(), 2);
        let names: Vec<&str> = ranked.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Near Police", "Mid Fire"]);
        assert_eq!(ranked[1].category_label, "Fire Station");

        // Same input, same order
        assert_eq!(rank(origin, candidates.clone(), 5), rank(origin, candidates, 5));
    }

    #[test]
    fn test_rank_breaks_ties_by_name() {
        let origin = Coordinates::new(0.0, 0.0);
        let ranked = rank(
            origin,
            vec![
                candidate("Beta", "hospital", 0.01, 0.0),
                candidate("Alpha", "police", 0.01, 0.0),
            ],
            5,
        );
        assert_eq!(ranked[0].name, "Alpha");
    }
}
