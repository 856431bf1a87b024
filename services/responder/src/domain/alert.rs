//! Alert record and its identity
//!
//! Alerts arrive as loosely-typed JSON from two channels. [`AlertPayload`]
//! accepts whatever the backend or push service sends; [`Alert`] is the
//! validated, immutable form the rest of the crate works with.

use std::fmt;

use chrono::{DateTime, NaiveDateTime};
use errors::{ResponderError, ResponderResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Title shown when a payload carries no usable title
pub const GENERIC_ALERT_TITLE: &str = "Emergency Alert";
/// Body shown when a payload carries no usable body
pub const GENERIC_ALERT_BODY: &str = "New emergency alert received";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Identity and ordering key of an alert: its creation instant
///
/// Offset timestamps are normalized to UTC; naive timestamps are taken as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AlertKey(NaiveDateTime);

impl AlertKey {
    pub fn parse(raw: &str) -> ResponderResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ResponderError::malformed("empty timestamp"));
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Self(dt.naive_utc()));
        }

        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(Self)
            .ok_or_else(|| ResponderError::malformed(format!("unparseable timestamp '{}'", raw)))
    }

    pub fn as_datetime(&self) -> NaiveDateTime {
        self.0
    }
}

impl From<NaiveDateTime> for AlertKey {
    fn from(dt: NaiveDateTime) -> Self {
        Self(dt)
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S%.f"))
    }
}

/// Severity ordinal, 1 = most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Priority(u8);

impl Priority {
    pub const CRITICAL: Priority = Priority(1);
    pub const HIGH: Priority = Priority(2);
    pub const MEDIUM: Priority = Priority(3);
    pub const LOW: Priority = Priority(4);

    /// Lenient conversion; anything outside 1..=4 becomes LOW
    pub fn from_value(value: Option<&Value>) -> Self {
        let raw = match value {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };

        match raw {
            Some(n @ 1..=4) => Priority(n as u8),
            _ => Priority::LOW,
        }
    }

    pub fn ordinal(&self) -> u8 {
        self.0
    }

    pub fn label(&self) -> &'static str {
        match self.0 {
            1 => "CRITICAL",
            2 => "HIGH",
            3 => "MEDIUM",
            _ => "LOW",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::LOW
    }
}

/// Alert as received on the wire, every field optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub priority: Option<Value>,
    #[serde(default)]
    pub emergency_type: Option<String>,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub play_sound: Option<bool>,
}

impl AlertPayload {
    /// Decode a JSON value; non-object values are malformed events
    pub fn from_value(value: Value) -> ResponderResult<Self> {
        serde_json::from_value(value).map_err(|e| ResponderError::malformed(e.to_string()))
    }

    pub fn from_json(raw: &str) -> ResponderResult<Self> {
        serde_json::from_str(raw).map_err(|e| ResponderError::malformed(e.to_string()))
    }
}

/// A validated emergency alert, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Explicit id, or the timestamp text when none was sent
    pub id: String,
    pub key: AlertKey,
    pub priority: Priority,
    pub title: String,
    pub body: String,
    pub transcript: Option<String>,
    pub emergency_type: String,
    pub emotion: String,
    pub location: String,
    pub play_sound: bool,
}

impl TryFrom<AlertPayload> for Alert {
    type Error = ResponderError;

    fn try_from(payload: AlertPayload) -> ResponderResult<Self> {
        let raw_timestamp = non_blank(payload.timestamp)
            .ok_or_else(|| ResponderError::malformed("missing timestamp"))?;
        let key = AlertKey::parse(&raw_timestamp)?;

        let transcript = non_blank(payload.transcript);
        let body = non_blank(payload.body)
            .or_else(|| transcript.clone())
            .ok_or_else(|| ResponderError::malformed(format!("alert {} has no body", key)))?;

        let priority = Priority::from_value(payload.priority.as_ref());
        let emergency_type = non_blank(payload.emergency_type).unwrap_or_else(|| "unknown".into());
        let title = non_blank(payload.title).unwrap_or_else(|| {
            format!("{} Emergency - {}", priority.label(), title_case(&emergency_type))
        });

        Ok(Self {
            id: non_blank(payload.id).unwrap_or(raw_timestamp),
            key,
            priority,
            title,
            body,
            transcript,
            emergency_type,
            emotion: non_blank(payload.emotion).unwrap_or_else(|| "CALM".into()),
            location: non_blank(payload.location).unwrap_or_default(),
            play_sound: payload.play_sound.unwrap_or(true),
        })
    }
}

impl Alert {
    /// Transcript (or body) cut to `max_chars` characters, `...` appended when cut
    pub fn preview(&self, max_chars: usize) -> String {
        truncate_chars(self.transcript.as_deref().unwrap_or(&self.body), max_chars)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Cut on a character boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// `fire_station` -> `Fire Station`
pub fn title_case(text: &str) -> String {
    text.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
