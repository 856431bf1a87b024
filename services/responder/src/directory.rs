//! Facility directory client
//!
//! Read-through access to the backend's list of response centers. The last
//! successful listing is cached so an unreachable backend still leaves the
//! operator with something to select from.

use std::sync::Arc;

use errors::{ResponderError, ResponderResult};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::backend::FacilityBackend;
use crate::domain::{Facility, NewFacility};

pub struct DirectoryClient {
    backend: Arc<dyn FacilityBackend>,
    cache: RwLock<Vec<Facility>>,
}

impl DirectoryClient {
    pub fn new(backend: Arc<dyn FacilityBackend>) -> Self {
        Self {
            backend,
            cache: RwLock::new(Vec::new()),
        }
    }

    /// Fetch the directory in backend order
    pub async fn list_facilities(&self) -> ResponderResult<Vec<Facility>> {
        match self.backend.list_centers().await {
            Ok(facilities) => {
                info!(count = facilities.len(), "Loaded facility directory");
                *self.cache.write().await = facilities.clone();
                Ok(facilities)
            },
            Err(e) => {
                warn!("Facility directory unavailable: {}", e);
                Err(ResponderError::DirectoryUnavailable(e.to_string()))
            },
        }
    }

    /// Last successful listing, empty before the first one
    pub async fn cached(&self) -> Vec<Facility> {
        self.cache.read().await.clone()
    }

    pub async fn find_cached(&self, name: &str) -> Option<Facility> {
        self.cache
            .read()
            .await
            .iter()
            .find(|f| f.matches_name(name))
            .cloned()
    }

    /// Look a facility up, refreshing the listing first when possible
    pub async fn find(&self, name: &str) -> Option<Facility> {
        if let Err(e) = self.list_facilities().await {
            warn!(facility = name, "Falling back to cached directory: {}", e);
        }
        self.find_cached(name).await
    }

    /// Register a new facility; blank fields are rejected before any request
    pub async fn register_facility(
        &self,
        name: &str,
        location: &str,
        region: &str,
        category: &str,
    ) -> ResponderResult<Facility> {
        let request = NewFacility::validated(name, location, region, category)?;
        let facility = self.backend.register_center(&request).await?;
        info!(facility = %facility.name, category = %facility.category, "Registered facility");

        let mut cache = self.cache.write().await;
        if !cache.iter().any(|f| f.matches_name(&facility.name)) {
            cache.push(facility.clone());
        }
        Ok(facility)
    }
}
