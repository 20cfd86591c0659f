//! Ingestion event schemas.
//!
//! Events arrive as Pub/Sub push deliveries: a JSON envelope whose
//! `message.data` is the base64 encoding of a storage notification.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Push delivery envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,

    /// Subscription the message was delivered through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

/// Message carried inside a push envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Base64-encoded JSON payload
    pub data: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<HashMap<String, String>>,
}

/// Decoded storage notification.
///
/// `name` is formatted as `<uid>-<timestamp>.<extension>`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IngestionEvent {
    /// Object name in the raw bucket
    #[validate(length(min = 1), custom(function = "validate_object_name"))]
    pub name: String,

    /// Bucket the object landed in (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Object names become scratch file names, so they must stay a single path component.
fn validate_object_name(name: &str) -> Result<(), ValidationError> {
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(ValidationError::new("object_name_not_a_file_name"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parsing() {
        let json = r#"{
            "message": {"data": "e30=", "messageId": "42", "attributes": {"a": "b"}},
            "subscription": "projects/p/subscriptions/raw-videos"
        }"#;
        let envelope: PushEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.message.data, "e30=");
        assert_eq!(envelope.message.message_id.as_deref(), Some("42"));
        assert!(envelope.subscription.is_some());
    }

    #[test]
    fn test_event_requires_name() {
        let result: Result<IngestionEvent, _> = serde_json::from_str(r#"{"bucket": "raw"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_event_validation() {
        let ok = IngestionEvent {
            name: "user123-1700000000.mp4".to_string(),
            bucket: None,
            content_type: Some("video/mp4".to_string()),
        };
        assert!(ok.validate().is_ok());

        let empty = IngestionEvent {
            name: String::new(),
            bucket: None,
            content_type: None,
        };
        assert!(empty.validate().is_err());

        let traversal = IngestionEvent {
            name: "../etc/passwd".to_string(),
            bucket: None,
            content_type: None,
        };
        assert!(traversal.validate().is_err());
    }
}
