//! Pipeline metrics.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::error::ErrorKind;
use crate::pipeline::JobStage;

pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "vproc_jobs_completed_total";
    /// Failed jobs by error kind and stage.
    pub const JOBS_FAILED_TOTAL: &str = "vproc_jobs_failed_total";
    /// Events rejected before a job started (invalid or duplicate).
    pub const JOBS_REJECTED_TOTAL: &str = "vproc_jobs_rejected_total";
    pub const JOB_DURATION_SECONDS: &str = "vproc_job_duration_seconds";
    pub const STEP_DURATION_SECONDS: &str = "vproc_step_duration_seconds";
    /// Scratch files that could not be deleted.
    pub const CLEANUP_FAILURES_TOTAL: &str = "vproc_cleanup_failures_total";
}

pub fn record_job_completed(elapsed: Duration) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS).record(elapsed.as_secs_f64());
}

pub fn record_job_failed(kind: ErrorKind, stage: JobStage) {
    counter!(
        names::JOBS_FAILED_TOTAL,
        "kind" => kind.as_str(),
        "stage" => stage.as_str()
    )
    .increment(1);
}

pub fn record_job_rejected(kind: ErrorKind) {
    counter!(names::JOBS_REJECTED_TOTAL, "kind" => kind.as_str()).increment(1);
}

pub fn record_step(stage: JobStage, elapsed: Duration) {
    histogram!(names::STEP_DURATION_SECONDS, "stage" => stage.as_str()).record(elapsed.as_secs_f64());
}

pub fn record_cleanup_failure() {
    counter!(names::CLEANUP_FAILURES_TOTAL).increment(1);
}
