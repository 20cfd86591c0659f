//! Pipeline error types.

use std::time::Duration;

use thiserror::Error;
use vproc_firestore::FirestoreError;
use vproc_media::MediaError;
use vproc_models::{VideoId, VideoStatus};
use vproc_storage::StorageError;

use crate::pipeline::JobStage;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or incomplete event; nothing was changed
    Validation,
    /// Job already claimed or completed; nothing was changed
    DuplicateJob,
    /// Metadata store, object store or local scratch failure
    Store,
    /// Encoder failure
    Transcode,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::DuplicateJob => "duplicate_job",
            ErrorKind::Store => "store",
            ErrorKind::Transcode => "transcode",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid event: {0}")]
    Validation(String),

    #[error("Video {video_id} is already {}", describe_status(.status))]
    DuplicateJob {
        video_id: VideoId,
        /// Stored status, or `None` when a concurrent claim won the race
        status: Option<VideoStatus>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metadata store error: {0}")]
    Metadata(#[from] FirestoreError),

    #[error("Object store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transcode error: {0}")]
    Transcode(#[from] MediaError),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: JobStage, after: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job {video_id} failed while {stage}: {source}")]
    JobFailed {
        video_id: VideoId,
        stage: JobStage,
        #[source]
        source: Box<PipelineError>,
    },
}

fn describe_status(status: &Option<VideoStatus>) -> &'static str {
    status.map(|s| s.as_str()).unwrap_or("claimed by another delivery")
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn duplicate(video_id: VideoId, status: Option<VideoStatus>) -> Self {
        Self::DuplicateJob { video_id, status }
    }

    /// Classification of this error, looking through `JobFailed`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::DuplicateJob { .. } => ErrorKind::DuplicateJob,
            PipelineError::Transcode(_) => ErrorKind::Transcode,
            PipelineError::Timeout { stage, .. } if *stage == JobStage::Converting => ErrorKind::Transcode,
            PipelineError::JobFailed { source, .. } => source.kind(),
            PipelineError::Config(_)
            | PipelineError::Metadata(_)
            | PipelineError::Storage(_)
            | PipelineError::Timeout { .. }
            | PipelineError::Io(_) => ErrorKind::Store,
        }
    }

    /// True when the request itself was at fault and retrying it is pointless.
    pub fn is_client_fault(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::DuplicateJob)
    }

    /// Stage a job failed in, if it got that far.
    pub fn stage(&self) -> Option<JobStage> {
        match self {
            PipelineError::JobFailed { stage, .. } | PipelineError::Timeout { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
