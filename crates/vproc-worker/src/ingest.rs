//! Ingestion event validation.
//!
//! A push delivery is accepted only if it decodes all the way down to a
//! usable object name. Anything else is a [`PipelineError::Validation`] and
//! nothing downstream runs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;
use validator::Validate;
use vproc_models::{IngestJob, IngestionEvent, PushEnvelope, PushMessage};

use crate::error::{PipelineError, PipelineResult};

/// Validate a raw push body and derive the job it describes.
pub fn validate_push(body: &[u8]) -> PipelineResult<IngestJob> {
    let envelope: PushEnvelope = serde_json::from_slice(body)
        .map_err(|e| PipelineError::validation(format!("invalid push envelope: {}", e)))?;

    let event = parse_event(&envelope.message)?;
    debug!(
        name = %event.name,
        bucket = ?event.bucket,
        content_type = ?event.content_type,
        message_id = ?envelope.message.message_id,
        "Accepted ingestion event"
    );

    IngestJob::from_source_name(event.name).map_err(|e| PipelineError::validation(e.to_string()))
}

/// Decode the storage notification carried by a push message.
pub fn parse_event(message: &PushMessage) -> PipelineResult<IngestionEvent> {
    if message.data.is_empty() {
        return Err(PipelineError::validation("message.data is empty"));
    }

    let bytes = STANDARD
        .decode(message.data.trim())
        .map_err(|e| PipelineError::validation(format!("message.data is not base64: {}", e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| PipelineError::validation("message.data is not UTF-8"))?;
    let event: IngestionEvent = serde_json::from_str(&text)
        .map_err(|e| PipelineError::validation(format!("message.data is not an ingestion event: {}", e)))?;

    event
        .validate()
        .map_err(|e| PipelineError::validation(format!("invalid object name: {}", e)))?;

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn push_body(payload: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "message": {"data": STANDARD.encode(payload), "messageId": "1"},
            "subscription": "projects/demo/subscriptions/raw-videos"
        }))
        .unwrap()
    }

    fn assert_invalid(body: &[u8]) {
        let err = validate_push(body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "got {err}");
    }

    #[test]
    fn test_valid_event() {
        let job = validate_push(&push_body(
            r#"{"name": "user123-1700000000.mp4", "bucket": "raw", "contentType": "video/mp4"}"#,
        ))
        .unwrap();

        assert_eq!(job.source_name, "user123-1700000000.mp4");
        assert_eq!(job.video_id.as_str(), "user123-1700000000");
        assert_eq!(job.uid(), "user123");
        assert_eq!(job.output_name, "processed-user123-1700000000.mp4");
    }

    #[test]
    fn test_id_strips_from_first_dot() {
        let job = validate_push(&push_body(r#"{"name": "u1-17.final.mov"}"#)).unwrap();
        assert_eq!(job.video_id.as_str(), "u1-17");
        assert_eq!(job.output_name, "processed-u1-17.final.mov");
    }

    #[test]
    fn test_envelope_not_json() {
        assert_invalid(b"not json");
    }

    #[test]
    fn test_missing_message_data() {
        assert_invalid(br#"{"message": {}}"#);
        assert_invalid(br#"{"message": {"data": ""}}"#);
    }

    #[test]
    fn test_data_not_base64() {
        assert_invalid(br#"{"message": {"data": "%%%not-base64%%%"}}"#);
    }

    #[test]
    fn test_payload_not_utf8() {
        let body = serde_json::to_vec(&serde_json::json!({
            "message": {"data": STANDARD.encode([0xff, 0xfe, 0xfd])}
        }))
        .unwrap();
        assert_invalid(&body);
    }

    #[test]
    fn test_payload_not_json() {
        assert_invalid(&push_body("name=user123-1.mp4"));
    }

    #[test]
    fn test_missing_or_empty_name() {
        assert_invalid(&push_body(r#"{"bucket": "raw"}"#));
        assert_invalid(&push_body(r#"{"name": ""}"#));
    }

    #[test]
    fn test_empty_video_id() {
        assert_invalid(&push_body(r#"{"name": ".mp4"}"#));
    }

    #[test]
    fn test_path_components_rejected() {
        assert_invalid(&push_body(r#"{"name": "../etc/passwd"}"#));
        assert_invalid(&push_body(r#"{"name": "nested/user-1.mp4"}"#));
    }
}
