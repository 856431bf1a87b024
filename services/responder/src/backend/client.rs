//! HTTP client for the response backend

use async_trait::async_trait;
use errors::{ResponderError, ResponderResult};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::models::{ErrorBody, GeocodeReply, GeocodeRequest, RegisterReply};
use super::{AlertFeed, FacilityBackend, SubscriptionSink};
use crate::config::BackendConfig;
use crate::domain::{AlertPayload, Facility, NewFacility, SubscriptionRecord};

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> ResponderResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `POST /geocode`
    pub async fn geocode(&self, location: &str) -> ResponderResult<GeocodeReply> {
        let response = self
            .client
            .post(self.url("/geocode"))
            .json(&GeocodeRequest { location })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            Err(ResponderError::transport(format!(
                "geocode returned {}: {}",
                status,
                error_message(response).await
            )))
        }
    }
}

/// Backend `{error}` text, or the status reason when the body has none
async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    }
}

#[async_trait]
impl FacilityBackend for HttpBackend {
    async fn list_centers(&self) -> ResponderResult<Vec<Facility>> {
        let response = self.client.get(self.url("/centers")).send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(ResponderError::transport(format!(
                "Failed to list centers: {}",
                response.status()
            )))
        }
    }

    async fn register_center(&self, facility: &NewFacility) -> ResponderResult<Facility> {
        let response = self
            .client
            .post(self.url("/register"))
            .json(facility)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let reply: RegisterReply = response.json().await?;
                Ok(reply.center)
            },
            StatusCode::CONFLICT => Err(ResponderError::DuplicateName(facility.name.clone())),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(ResponderError::validation("form", error_message(response).await))
            },
            status => Err(ResponderError::transport(format!(
                "Failed to register center: {}: {}",
                status,
                error_message(response).await
            ))),
        }
    }
}

#[async_trait]
impl AlertFeed for HttpBackend {
    async fn fetch_alerts(&self, center: &str) -> ResponderResult<Vec<AlertPayload>> {
        let response = self
            .client
            .get(self.url("/alerts"))
            .query(&[("center", center)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ResponderError::transport(format!(
                "Failed to fetch alerts for {}: {}",
                center,
                response.status()
            )));
        }

        let records: Vec<Value> = response.json().await?;
        let total = records.len();
        let payloads: Vec<AlertPayload> = records
            .into_iter()
            .filter_map(|record| match AlertPayload::from_value(record) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(facility = center, "Skipping undecodable alert record: {}", e);
                    None
                },
            })
            .collect();

        debug!(facility = center, total, decoded = payloads.len(), "Fetched alert feed");
        Ok(payloads)
    }
}

#[async_trait]
impl SubscriptionSink for HttpBackend {
    async fn upsert_subscription(&self, record: &SubscriptionRecord) -> ResponderResult<()> {
        let response = self
            .client
            .post(self.url("/subscribe"))
            .json(record)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            Err(ResponderError::transport(format!(
                "Failed to save subscription: {}: {}",
                status,
                error_message(response).await
            )))
        }
    }
}
