//! Resolver talking to a free-text geocoder and a radius search directly

use async_trait::async_trait;
use errors::{ResponderError, ResponderResult};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{rank, Candidate, IncidentResolver};
use crate::config::ResolverConfig;
use crate::domain::{Coordinates, Resolution, ResolvedIncident};

/// Amenity kinds searched around an incident
const NODE_AMENITIES: [&str; 5] = ["hospital", "clinic", "doctors", "police", "fire_station"];
const WAY_AMENITIES: [&str; 2] = ["hospital", "clinic"];

/// Free text to a point
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the text matches nothing
    async fn geocode(&self, text: &str) -> ResponderResult<Option<(Coordinates, String)>>;
}

/// Named facilities within a radius of a point
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    async fn search(&self, origin: Coordinates) -> ResponderResult<Vec<Candidate>>;
}

fn http_client(config: &ResolverConfig) -> ResponderResult<Client> {
    Ok(Client::builder()
        .timeout(config.request_timeout())
        .user_agent(config.user_agent.clone())
        .build()?)
}

// Nominatim returns coordinates as strings
#[derive(Debug, Deserialize)]
struct GeocodeHit {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

pub struct NominatimGeocoder {
    client: Client,
    url: String,
}

impl NominatimGeocoder {
    pub fn new(config: &ResolverConfig) -> ResponderResult<Self> {
        Ok(Self {
            client: http_client(config)?,
            url: config.geocoder_url.clone(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, text: &str) -> ResponderResult<Option<(Coordinates, String)>> {
        let hits: Vec<GeocodeHit> = self
            .client
            .get(&self.url)
            .query(&[("q", text), ("format", "json"), ("limit", "1"), ("addressdetails", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };

        let lat = hit.lat.parse::<f64>();
        let lon = hit.lon.parse::<f64>();
        match (lat, lon) {
            (Ok(lat), Ok(lon)) => Ok(Some((Coordinates::new(lat, lon), hit.display_name))),
            _ => Err(ResponderError::Serialization(format!(
                "geocoder returned non-numeric coordinates {} / {}",
                hit.lat, hit.lon
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OverpassReply {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn into_candidate(self) -> Option<Candidate> {
        let name = self.tags.get("name").map(|n| n.trim().to_string())?;
        if name.is_empty() {
            return None;
        }

        let coordinates = match self.kind.as_str() {
            "node" => Coordinates::new(self.lat?, self.lon?),
            "way" => {
                let center = self.center?;
                Coordinates::new(center.lat, center.lon)
            },
            _ => return None,
        };

        Some(Candidate {
            name,
            category: self
                .tags
                .get("amenity")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            coordinates,
        })
    }
}

/// Overpass radius search over a list of mirrors, tried in order
pub struct OverpassSearch {
    client: Client,
    mirrors: Vec<String>,
    radius_m: u32,
}

impl OverpassSearch {
    pub fn new(config: &ResolverConfig) -> ResponderResult<Self> {
        Ok(Self {
            client: http_client(config)?,
            mirrors: config.overpass_urls.clone(),
            radius_m: config.radius_m,
        })
    }

    pub fn query(&self, origin: Coordinates) -> String {
        let around = format!("(around:{},{},{})", self.radius_m, origin.lat, origin.lon);
        let mut query = String::from("[out:json][timeout:20];\n(\n");
        for amenity in NODE_AMENITIES {
            query.push_str(&format!("  node[\"amenity\"=\"{}\"]{};\n", amenity, around));
        }
        for amenity in WAY_AMENITIES {
            query.push_str(&format!("  way[\"amenity\"=\"{}\"]{};\n", amenity, around));
        }
        query.push_str(");\nout center body;\n");
        query
    }

    async fn query_mirror(&self, mirror: &str, query: &str) -> ResponderResult<Vec<Candidate>> {
        let reply: OverpassReply = self
            .client
            .post(mirror)
            .form(&[("data", query)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(reply
            .elements
            .into_iter()
            .filter_map(OverpassElement::into_candidate)
            .collect())
    }
}

#[async_trait]
impl PlaceSearch for OverpassSearch {
    async fn search(&self, origin: Coordinates) -> ResponderResult<Vec<Candidate>> {
        let query = self.query(origin);

        for mirror in &self.mirrors {
            match self.query_mirror(mirror, &query).await {
                Ok(candidates) => {
                    debug!(mirror = %mirror, count = candidates.len(), "Radius search answered");
                    return Ok(candidates);
                },
                Err(e) => warn!(mirror = %mirror, "Radius search failed, trying next mirror: {}", e),
            }
        }

        warn!("All radius search mirrors failed");
        Ok(Vec::new())
    }
}

/// Geocode, search, rank
pub struct GeoResolver<G, S> {
    geocoder: G,
    search: S,
    max_results: usize,
}

impl<G: Geocoder, S: PlaceSearch> GeoResolver<G, S> {
    pub fn new(geocoder: G, search: S, max_results: usize) -> Self {
        Self {
            geocoder,
            search,
            max_results,
        }
    }
}

#[async_trait]
impl<G: Geocoder, S: PlaceSearch> IncidentResolver for GeoResolver<G, S> {
    async fn resolve(&self, location_text: &str) -> Resolution {
        let text = location_text.trim();
        if text.is_empty() {
            return Resolution::NotFound;
        }

        let (origin, display_name) = match self.geocoder.geocode(text).await {
            Ok(Some(hit)) => hit,
            Ok(None) => {
                info!(location = text, "Location not found");
                return Resolution::NotFound;
            },
            Err(e) => {
                warn!(location = text, "Geocoding failed: {}", e);
                return Resolution::NotFound;
            },
        };

        let candidates = self.search.search(origin).await.unwrap_or_else(|e| {
            warn!(location = text, "Radius search failed: {}", e);
            Vec::new()
        });

        Resolution::Found(ResolvedIncident {
            coordinates: origin,
            display_name,
            facilities: rank(origin, candidates, self.max_results),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ResolverConfig {
        ResolverConfig {
            geocoder_url: format!("{}/search", server.uri()),
            overpass_urls: vec![
                format!("{}/mirror-a", server.uri()),
                format!("{}/mirror-b", server.uri()),
            ],
            request_timeout_ms: 2_000,
            ..ResolverConfig::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_against_mock_providers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Andheri East"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"lat": "19.1136", "lon": "72.8697", "display_name": "Andheri East, Mumbai"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mirror-a"))
            .respond_with(ResponseTemplate::new(504))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mirror-b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "elements": [
                    {"type": "node", "lat": 19.12, "lon": 72.87,
                     "tags": {"amenity": "police", "name": "MIDC Police Station"}},
                    {"type": "way", "center": {"lat": 19.114, "lon": 72.87},
                     "tags": {"amenity": "hospital", "name": "Holy Spirit Hospital"}},
                    {"type": "node", "lat": 19.113, "lon": 72.869,
                     "tags": {"amenity": "clinic"}},
                    {"type": "way", "tags": {"amenity": "clinic", "name": "No Center"}}
                ]
            })))
            .mount(&server)
            .await;

        let cfg = config(&server);
        let resolver = GeoResolver::new(
            NominatimGeocoder::new(&cfg).unwrap(),
            OverpassSearch::new(&cfg).unwrap(),
            cfg.max_results,
        );

        let Resolution::Found(incident) = resolver.resolve("Andheri East").await else {
            panic!("expected a resolved incident");
        };
        assert_eq!(incident.display_name, "Andheri East, Mumbai");
        let names: Vec<&str> = incident.facilities.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Holy Spirit Hospital", "MIDC Police Station"]);
    }

    #[tokio::test]
    async fn test_geocoder_miss_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let cfg = config(&server);
        let resolver = GeoResolver::new(
            NominatimGeocoder::new(&cfg).unwrap(),
            OverpassSearch::new(&cfg).unwrap(),
            5,
        );
        assert_eq!(resolver.resolve("Atlantis").await, Resolution::NotFound);
    }

    struct FixedGeocoder(Arc<AtomicUsize>);

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn geocode(&self, _text: &str) -> ResponderResult<Option<(Coordinates, String)>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Some((Coordinates::new(10.0, 10.0), "Somewhere".into())))
        }
    }

    struct EmptySearch;

    #[async_trait]
    impl PlaceSearch for EmptySearch {
        async fn search(&self, _origin: Coordinates) -> ResponderResult<Vec<Candidate>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_zero_facilities_is_found_and_empty() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = GeoResolver::new(FixedGeocoder(calls.clone()), EmptySearch, 5);

        let resolution = resolver.resolve("Open desert").await;
        assert!(resolution.is_found());
        assert!(resolution.facilities().is_empty());

        assert_eq!(resolver.resolve("   ").await, Resolution::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_query_covers_every_amenity() {
        let search = OverpassSearch::new(&ResolverConfig::default()).unwrap();
        let query = search.query(Coordinates::new(19.0, 72.8));
        assert!(query.contains("node[\"amenity\"=\"fire_station\"](around:5000,19,72.8)"));
        assert!(query.contains("way[\"amenity\"=\"clinic\"]"));
        assert!(query.trim_end().ends_with("out center body;"));
    }
}
