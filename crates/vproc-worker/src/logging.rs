//! Structured job logging.

use std::time::Duration;

use tracing::{error, info, warn, Span};
use vproc_models::VideoId;

use crate::pipeline::JobStage;

/// Logs job lifecycle events with the video id and operation attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    video_id: String,
    operation: String,
}

impl JobLogger {
    pub fn new(video_id: &VideoId, operation: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log entry into a stage.
    pub fn log_stage(&self, stage: JobStage) {
        info!(
            video_id = %self.video_id,
            operation = %self.operation,
            stage = %stage,
            "Job stage: {}", stage
        );
    }

    /// Log a finished step with its duration.
    pub fn log_step_done(&self, stage: JobStage, elapsed: Duration) {
        info!(
            video_id = %self.video_id,
            operation = %self.operation,
            stage = %stage,
            elapsed_ms = elapsed.as_millis() as u64,
            "Job step finished: {}", stage
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            video_id = %self.video_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, stage: JobStage, message: &str) {
        error!(
            video_id = %self.video_id,
            operation = %self.operation,
            stage = %stage,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span wrapping the whole job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            video_id = %self.video_id,
            operation = %self.operation
        )
    }
}
