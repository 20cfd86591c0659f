//! Pipeline orchestrator.
//!
//! A job moves through
//! `Validating -> Downloading -> Converting -> Uploading -> UpdatingStatus`,
//! then always through `CleaningUp` before ending `Done` or `Failed`. Steps run
//! once each, in order; the first failure skips the remaining steps.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn, Instrument};
use vproc_firestore::VideoStore;
use vproc_media::Transcoder;
use vproc_models::{IngestJob, Video, VideoId};
use vproc_storage::ObjectStore;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::guard::DuplicateGuard;
use crate::ingest::validate_push;
use crate::logging::JobLogger;
use crate::metrics;
use crate::scratch::{ScratchDirs, ScratchFiles};

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStage {
    /// Event decoding and the duplicate claim
    Validating,
    Downloading,
    Converting,
    Uploading,
    UpdatingStatus,
    CleaningUp,
    Done,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Validating => "validating",
            JobStage::Downloading => "downloading",
            JobStage::Converting => "converting",
            JobStage::Uploading => "uploading",
            JobStage::UpdatingStatus => "updating_status",
            JobStage::CleaningUp => "cleaning_up",
            JobStage::Done => "done",
            JobStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Done | JobStage::Failed)
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a job that reached `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub video_id: VideoId,
    /// Published rendition name
    pub filename: String,
    pub elapsed: Duration,
}

/// Runs ingestion jobs against injected stores and transcoder.
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    scratch: ScratchDirs,
    objects: Arc<dyn ObjectStore>,
    videos: Arc<dyn VideoStore>,
    transcoder: Arc<dyn Transcoder>,
    guard: DuplicateGuard,
}

type StepResult<T> = Result<T, (JobStage, PipelineError)>;

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        objects: Arc<dyn ObjectStore>,
        videos: Arc<dyn VideoStore>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            scratch: ScratchDirs::new(&config.intake_dir, &config.output_dir),
            guard: DuplicateGuard::new(Arc::clone(&videos)),
            config,
            objects,
            videos,
            transcoder,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn scratch(&self) -> &ScratchDirs {
        &self.scratch
    }

    /// Create the scratch directories. Safe to call more than once.
    pub async fn prepare(&self) -> PipelineResult<()> {
        self.scratch.ensure().await?;
        Ok(())
    }

    /// Validate a push body, claim the job and run it.
    pub async fn handle_push(&self, body: &[u8]) -> PipelineResult<JobReport> {
        debug!(stage = %JobStage::Validating, bytes = body.len(), "Validating push");
        let job = validate_push(body).inspect_err(|e| {
            metrics::record_job_rejected(e.kind());
            warn!(kind = e.kind().as_str(), "Rejected push: {}", e);
        })?;
        self.handle_job(job).await
    }

    /// Claim a job and run it.
    ///
    /// The claim belongs to `Validating`: a job has no scratch files until it
    /// is claimed. A store failure here is a failed job, not a rejection.
    pub async fn handle_job(&self, job: IngestJob) -> PipelineResult<JobReport> {
        let logger = JobLogger::new(&job.video_id, "claim");
        logger.log_stage(JobStage::Validating);

        if let Err(e) = self.guard.claim(&job).await {
            if e.is_client_fault() {
                metrics::record_job_rejected(e.kind());
                logger.log_warning(&format!("Rejected: {}", e));
            } else {
                metrics::record_job_failed(e.kind(), JobStage::Validating);
                logger.log_error(JobStage::Validating, &format!("Claim failed: {}", e));
            }
            return Err(e);
        }
        self.run(job).await
    }

    /// Run an already-claimed job to a terminal state.
    ///
    /// Scratch files are removed before this returns, on success and failure
    /// alike. A failure is returned as [`PipelineError::JobFailed`] naming the
    /// stage that failed; the video record keeps whatever status was last
    /// written.
    pub async fn run(&self, job: IngestJob) -> PipelineResult<JobReport> {
        let logger = JobLogger::new(&job.video_id, "process_video");
        let span = logger.create_span();

        async move {
            let started = Instant::now();
            logger.log_start(&job.source_name);

            let files = self.scratch.files_for(&job);
            let outcome = self.execute(&job, &files, &logger).await;

            logger.log_stage(JobStage::CleaningUp);
            if let Err(e) = files.release().await {
                metrics::record_cleanup_failure();
                logger.log_warning(&format!("Scratch cleanup failed: {}", e));
            }

            match outcome {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    metrics::record_job_completed(elapsed);
                    logger.log_stage(JobStage::Done);
                    logger.log_completion(&job.output_name);
                    Ok(JobReport {
                        video_id: job.video_id,
                        filename: job.output_name,
                        elapsed,
                    })
                }
                Err((stage, source)) => {
                    metrics::record_job_failed(source.kind(), stage);
                    logger.log_error(stage, &source.to_string());
                    logger.log_stage(JobStage::Failed);
                    Err(PipelineError::JobFailed {
                        video_id: job.video_id,
                        stage,
                        source: Box::new(source),
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, job: &IngestJob, files: &ScratchFiles, logger: &JobLogger) -> StepResult<()> {
        self.step(
            JobStage::Downloading,
            logger,
            self.objects
                .fetch(&self.config.raw_bucket, &job.source_name, files.intake()),
        )
        .await?;

        self.step(
            JobStage::Converting,
            logger,
            self.transcoder.transcode(files.intake(), files.output()),
        )
        .await?;

        self.step(
            JobStage::Uploading,
            logger,
            self.objects
                .store(files.output(), &self.config.processed_bucket, &job.output_name),
        )
        .await?;

        self.step(
            JobStage::UpdatingStatus,
            logger,
            self.videos
                .set_video(&job.video_id, &Video::processed(&job.output_name)),
        )
        .await?;

        Ok(())
    }

    /// Run one step, applying the configured step timeout.
    ///
    /// On timeout the step future is dropped, which for a transcode stops the
    /// encoder.
    async fn step<T, E, F>(&self, stage: JobStage, logger: &JobLogger, fut: F) -> StepResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<PipelineError>,
    {
        logger.log_stage(stage);
        let started = Instant::now();

        let result = match self.config.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(PipelineError::Timeout {
                    stage,
                    after: limit,
                }),
            },
            None => fut.await.map_err(Into::into),
        };

        let elapsed = started.elapsed();
        metrics::record_step(stage, elapsed);
        match result {
            Ok(value) => {
                logger.log_step_done(stage, elapsed);
                Ok(value)
            }
            Err(e) => Err((stage, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(JobStage::UpdatingStatus.to_string(), "updating_status");
        assert!(JobStage::Done.is_terminal());
        assert!(JobStage::Failed.is_terminal());
        assert!(!JobStage::CleaningUp.is_terminal());
    }
}
