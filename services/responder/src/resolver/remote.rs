use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{rank, Candidate, IncidentResolver};
use crate::backend::{GeocodeReply, GeocodedService, HttpBackend};
use crate::domain::{Coordinates, Resolution, ResolvedIncident};

/// Resolver backed by the response backend's `POST /geocode`
pub struct BackendResolver {
    backend: Arc<HttpBackend>,
    max_results: usize,
}

impl BackendResolver {
    pub fn new(backend: Arc<HttpBackend>, max_results: usize) -> Self {
        Self {
            backend,
            max_results,
        }
    }
}

impl From<GeocodedService> for Candidate {
    fn from(service: GeocodedService) -> Self {
        Self {
            name: service.name,
            category: service.kind,
            coordinates: Coordinates::new(service.lat, service.lon),
        }
    }
}

/// Re-rank the backend's list so both resolver modes order identically
pub(crate) fn resolution_from_reply(
    reply: GeocodeReply,
    max_results: usize,
) -> Option<ResolvedIncident> {
    if !reply.found {
        return None;
    }
    let location = reply.location?;
    let origin = Coordinates::new(location.lat, location.lon);
    let candidates = reply
        .emergency_services
        .into_iter()
        .map(Candidate::from)
        .collect();

    Some(ResolvedIncident {
        coordinates: origin,
        display_name: location.display_name,
        facilities: rank(origin, candidates, max_results),
    })
}

#[async_trait]
impl IncidentResolver for BackendResolver {
    async fn resolve(&self, location_text: &str) -> Resolution {
        let text = location_text.trim();
        if text.is_empty() {
            return Resolution::NotFound;
        }

        match self.backend.geocode(text).await {
            Ok(reply) => {
                let reason = reply.error.clone();
                match resolution_from_reply(reply, self.max_results) {
                    Some(incident) => Resolution::Found(incident),
                    None => {
                        info!(
                            location = text,
                            reason = reason.as_deref().unwrap_or("no match"),
                            "Location not found"
                        );
                        Resolution::NotFound
                    },
                }
            },
            Err(e) => {
                warn!(location = text, "Geocode request failed: {}", e);
                Resolution::NotFound
            },
        }
    }
}
