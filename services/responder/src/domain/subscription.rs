//! Push subscription records and the application-server key

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Placeholder the backend distributes when push is not set up
pub const KEY_NOT_CONFIGURED: &str = "NOT_CONFIGURED";

/// Length of an uncompressed P-256 point
const UNCOMPRESSED_POINT_LEN: usize = 65;

/// Client keys of a push subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Push endpoint plus keys, as issued by the push provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(rename = "expirationTime", default)]
    pub expiration_time: Option<i64>,
    pub keys: SubscriptionKeys,
}

/// Body of `POST /subscribe`; upserted by facility name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub center_name: String,
    pub subscription: PushSubscription,
}

/// Why no application-server key is usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyUnavailable {
    /// Absent, blank or the not-configured placeholder
    NotConfigured,
    /// Present but not a base64url P-256 point
    Invalid(String),
}

/// Decoded application-server public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationServerKey {
    encoded: String,
    bytes: Vec<u8>,
}

impl ApplicationServerKey {
    pub fn parse(raw: Option<&str>) -> Result<Self, KeyUnavailable> {
        let encoded = match raw.map(str::trim) {
            None | Some("") | Some(KEY_NOT_CONFIGURED) => return Err(KeyUnavailable::NotConfigured),
            Some(encoded) => encoded.trim_end_matches('='),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| KeyUnavailable::Invalid(format!("not base64url: {}", e)))?;

        if bytes.len() != UNCOMPRESSED_POINT_LEN || bytes[0] != 0x04 {
            return Err(KeyUnavailable::Invalid(format!(
                "expected a {}-byte uncompressed point, got {} bytes",
                UNCOMPRESSED_POINT_LEN,
                bytes.len()
            )));
        }

        Ok(Self {
            encoded: encoded.to_string(),
            bytes,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
