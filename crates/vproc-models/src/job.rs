//! Canonical job descriptor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::video::VideoId;

/// Prefix given to published renditions.
pub const PROCESSED_PREFIX: &str = "processed-";

/// Errors deriving a job from an object name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobIdError {
    #[error("object name is empty")]
    EmptyName,

    #[error("object name {0:?} has no video id before its extension")]
    EmptyVideoId(String),
}

/// One unit of work: a raw object to transcode and publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestJob {
    /// Object name in the raw bucket, also the intake scratch file name
    pub source_name: String,
    /// Source name with its extension stripped
    pub video_id: VideoId,
    /// Object name in the processed bucket, also the output scratch file name
    pub output_name: String,
}

impl IngestJob {
    /// Derive a job from a raw object name such as `user123-1700000000.mp4`.
    pub fn from_source_name(name: impl Into<String>) -> Result<Self, JobIdError> {
        let source_name = name.into();
        if source_name.is_empty() {
            return Err(JobIdError::EmptyName);
        }

        let stem = source_name.split('.').next().unwrap_or_default();
        if stem.is_empty() {
            return Err(JobIdError::EmptyVideoId(source_name));
        }

        Ok(Self {
            video_id: VideoId::from(stem),
            output_name: format!("{}{}", PROCESSED_PREFIX, source_name),
            source_name,
        })
    }

    /// Owner identifier.
    pub fn uid(&self) -> &str {
        self.video_id.uid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation() {
        let job = IngestJob::from_source_name("user123-1700000000.mp4").unwrap();
        assert_eq!(job.video_id.as_str(), "user123-1700000000");
        assert_eq!(job.uid(), "user123");
        assert_eq!(job.output_name, "processed-user123-1700000000.mp4");
        assert_eq!(job.source_name, "user123-1700000000.mp4");
    }

    #[test]
    fn test_only_first_extension_boundary_counts() {
        let job = IngestJob::from_source_name("abc-1.tar.gz").unwrap();
        assert_eq!(job.video_id.as_str(), "abc-1");
    }

    #[test]
    fn test_name_without_extension() {
        let job = IngestJob::from_source_name("abc-1").unwrap();
        assert_eq!(job.video_id.as_str(), "abc-1");
        assert_eq!(job.output_name, "processed-abc-1");
    }

    #[test]
    fn test_rejects_empty_names() {
        assert_eq!(IngestJob::from_source_name(""), Err(JobIdError::EmptyName));
        assert!(matches!(
            IngestJob::from_source_name(".mp4"),
            Err(JobIdError::EmptyVideoId(_))
        ));
    }
}
