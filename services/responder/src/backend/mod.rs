//! Response backend access
//!
//! Each component depends on the narrow trait it needs so tests can swap in
//! an in-memory fake; [`HttpBackend`] implements all of them over HTTP.

pub mod client;
pub mod models;

use async_trait::async_trait;
use errors::ResponderResult;

use crate::domain::{AlertPayload, Facility, NewFacility, SubscriptionRecord};

pub use client::HttpBackend;
pub use models::{GeocodeReply, GeocodedService};

/// `GET /centers` and `POST /register`
#[async_trait]
pub trait FacilityBackend: Send + Sync {
    async fn list_centers(&self) -> ResponderResult<Vec<Facility>>;

    async fn register_center(&self, facility: &NewFacility) -> ResponderResult<Facility>;
}

/// `GET /alerts?center=<name>`, newest first
#[async_trait]
pub trait AlertFeed: Send + Sync {
    /// Records that fail to decode are skipped, not fatal
    async fn fetch_alerts(&self, center: &str) -> ResponderResult<Vec<AlertPayload>>;
}

/// `POST /subscribe`, an idempotent upsert keyed by facility name
#[async_trait]
pub trait SubscriptionSink: Send + Sync {
    async fn upsert_subscription(&self, record: &SubscriptionRecord) -> ResponderResult<()>;
}
