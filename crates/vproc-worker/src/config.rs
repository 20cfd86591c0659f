//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bucket raw uploads land in
    pub raw_bucket: String,
    /// Bucket renditions are published to
    pub processed_bucket: String,
    /// Local directory for downloaded sources
    pub intake_dir: PathBuf,
    /// Local directory for transcoded renditions
    pub output_dir: PathBuf,
    /// Limit applied to each pipeline step (none when unset)
    pub step_timeout: Option<Duration>,
}

impl PipelineConfig {
    pub fn new(raw_bucket: impl Into<String>, processed_bucket: impl Into<String>) -> Self {
        Self {
            raw_bucket: raw_bucket.into(),
            processed_bucket: processed_bucket.into(),
            intake_dir: PathBuf::from("./raw-videos"),
            output_dir: PathBuf::from("./processed-videos"),
            step_timeout: None,
        }
    }

    /// Use the given scratch directories.
    pub fn with_scratch_dirs(mut self, intake: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        self.intake_dir = intake.into();
        self.output_dir = output.into();
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    /// Create config from environment variables.
    pub fn from_env() -> PipelineResult<Self> {
        let required = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| PipelineError::config_error(format!("{} must be set", name)))
        };

        let mut config = Self::new(required("RAW_VIDEO_BUCKET")?, required("PROCESSED_VIDEO_BUCKET")?);
        if let Ok(dir) = std::env::var("INTAKE_DIR") {
            config.intake_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        config.step_timeout = std::env::var("PIPELINE_STEP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(config)
    }
}
