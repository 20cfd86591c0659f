//! Shared data models for the vproc pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video job records stored in the metadata store
//! - Ingestion events delivered by the push transport
//! - The canonical job descriptor derived from an event
//! - Encoding defaults for the 360p rendition

pub mod encoding;
pub mod event;
pub mod job;
pub mod video;

// Re-export common types
pub use encoding::EncodingConfig;
pub use event::{IngestionEvent, PushEnvelope, PushMessage};
pub use job::{IngestJob, JobIdError, PROCESSED_PREFIX};
pub use video::{Video, VideoId, VideoStatus};
