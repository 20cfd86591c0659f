//! Video processing job pipeline.
//!
//! This crate provides:
//! - Validation of push-delivered ingestion events
//! - The duplicate guard that claims a job before any work starts
//! - The download, transcode, upload and status-update orchestration
//! - Scratch directory management with guaranteed cleanup

pub mod config;
pub mod error;
pub mod guard;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod scratch;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use guard::DuplicateGuard;
pub use ingest::{parse_event, validate_push};
pub use logging::JobLogger;
pub use pipeline::{JobReport, JobStage, Pipeline};
pub use scratch::{remove_if_exists, ScratchDirs, ScratchFiles};

#[cfg(test)]
mod pipeline_tests;
