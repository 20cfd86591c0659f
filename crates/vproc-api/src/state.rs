//! Application state.

use std::sync::Arc;

use tracing::{info, warn};
use vproc_firestore::VideoRepository;
use vproc_media::{check_ffmpeg, FfmpegTranscoder};
use vproc_storage::S3ObjectStore;
use vproc_worker::{Pipeline, PipelineConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Create new application state wired to the production stores.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let pipeline_config = PipelineConfig::from_env()?;
        info!(
            "Pipeline config: raw={}, processed={}, step_timeout={:?}",
            pipeline_config.raw_bucket, pipeline_config.processed_bucket, pipeline_config.step_timeout
        );

        let objects = S3ObjectStore::from_env().await?;
        let videos = VideoRepository::from_env().await?;

        match check_ffmpeg() {
            Ok(path) => info!("Using ffmpeg at {}", path.display()),
            Err(e) => warn!("{}; transcodes will fail until it is installed", e),
        }
        let transcoder = FfmpegTranscoder::from_env();

        let pipeline = Pipeline::new(
            pipeline_config,
            Arc::new(objects),
            Arc::new(videos),
            Arc::new(transcoder),
        );
        pipeline.prepare().await?;

        Ok(Self::with_pipeline(config, pipeline))
    }

    /// Create state around an existing pipeline.
    pub fn with_pipeline(config: ApiConfig, pipeline: Pipeline) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
        }
    }
}
