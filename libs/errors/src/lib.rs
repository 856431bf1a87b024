//! Unified error handling for the Responder workspace
//!
//! Every failure the alert core can observe maps onto one variant of
//! [`ResponderError`]. Callers decide how to degrade with the classification
//! helpers instead of matching on message text.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// ErrorInfo - operator-facing error record
// ============================================================================

/// Error information rendered on the operator surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (see [`ResponderError::error_code`])
    pub code: String,
    /// Error message, verbatim for user-correctable errors
    pub message: String,
    /// Field-specific errors for validation
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub field_errors: HashMap<String, Vec<String>>,
}

impl ErrorInfo {
    /// Create a new ErrorInfo with a code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field_errors: HashMap::new(),
        }
    }

    /// Add a field error
    pub fn add_field_error(mut self, field: impl Into<String>, error: impl Into<String>) -> Self {
        self.field_errors
            .entry(field.into())
            .or_default()
            .push(error.into());
        self
    }
}

// ============================================================================
// ResponderError - Main error type
// ============================================================================

/// Main error type for the alert core and its binary
#[derive(Debug, Error)]
pub enum ResponderError {
    // ======================================
    // Delivery path errors
    // ======================================
    /// Network or backend unreachable; retried by the next poll tick
    #[error("Transport error: {0}")]
    Transport(String),

    /// Notification permission refused by the operator
    #[error("Notification permission denied")]
    PermissionDenied,

    /// Event payload lacks the fields needed to identify an alert
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    // ======================================
    // Directory errors
    // ======================================
    #[error("Facility directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Validation failed: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("A facility named '{0}' already exists")]
    DuplicateName(String),

    // ======================================
    // Lookup errors
    // ======================================
    #[error("Not found: {0}")]
    NotFound(String),

    // ======================================
    // Ambient errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using ResponderError
pub type ResponderResult<T> = Result<T, ResponderError>;

impl ResponderError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEvent(msg.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// True for failures that the next poll tick retries on its own
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::DirectoryUnavailable(_))
    }

    /// True for failures the operator fixes by editing input
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::DuplicateName(_))
    }

    /// Stable code used in logs and [`ErrorInfo`]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::MalformedEvent(_) => "MALFORMED_EVENT",
            Self::DirectoryUnavailable(_) => "DIRECTORY_UNAVAILABLE",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::DuplicateName(_) => "DUPLICATE_NAME",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to the record shown on the operator surface
    pub fn to_error_info(&self) -> ErrorInfo {
        match self {
            // Backend wording is surfaced verbatim for correction
            Self::Validation { field, message } => {
                ErrorInfo::new(self.error_code(), message.clone()).add_field_error(field, message)
            },
            Self::DuplicateName(name) => ErrorInfo::new(self.error_code(), self.to_string())
                .add_field_error("name", format!("'{}' is already registered", name)),
            _ => ErrorInfo::new(self.error_code(), self.to_string()),
        }
    }
}

// Conversion traits for common error types
impl From<reqwest::Error> for ResponderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ResponderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ResponderError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ResponderError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ResponderError::validation("location", "Location is required");
        assert_eq!(
            err.to_string(),
            "Validation failed: location: Location is required"
        );

        let err = ResponderError::DuplicateName("Central Hospital".to_string());
        assert!(err.to_string().contains("Central Hospital"));
    }

    #[test]
    fn test_classification() {
        assert!(ResponderError::transport("connection refused").is_transient());
        assert!(ResponderError::DirectoryUnavailable("503".into()).is_transient());
        assert!(!ResponderError::PermissionDenied.is_transient());
        assert!(!ResponderError::malformed("no timestamp").is_transient());

        assert!(ResponderError::validation("name", "required").is_user_correctable());
        assert!(ResponderError::DuplicateName("x".into()).is_user_correctable());
        assert!(!ResponderError::NotFound("x".into()).is_user_correctable());
    }

    #[test]
    fn test_error_info_keeps_backend_message() {
        let info =
            ResponderError::validation("region", "Name, location, and state are required")
                .to_error_info();
        assert_eq!(info.code, "VALIDATION_ERROR");
        assert_eq!(info.message, "Name, location, and state are required");
        assert_eq!(
            info.field_errors.get("region"),
            Some(&vec!["Name, location, and state are required".to_string()])
        );
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: ResponderError = match parse {
            Ok(_) => panic!("expected parse failure"),
            Err(e) => e.into(),
        };
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
    }
}
