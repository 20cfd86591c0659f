//! Push endpoint for ingestion events.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::{error, info};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Body returned once a job reaches `Done`.
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub status: &'static str,
    pub video_id: String,
    pub filename: String,
}

/// Handle one push delivery.
///
/// The body is taken raw so that a malformed envelope is reported as a
/// validation failure rather than an extractor rejection. The job runs on its
/// own task: once accepted it is carried to a terminal state even if the
/// caller disconnects. The response is only sent after the job's scratch
/// files are gone.
pub async fn process_video(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ProcessResponse>> {
    let pipeline = Arc::clone(&state.pipeline);
    let job = tokio::spawn(async move { pipeline.handle_push(&body).await });

    let outcome = job.await.map_err(|e| {
        error!("Job task did not finish: {}", e);
        ApiError::internal(format!("job task did not finish: {}", e))
    })?;

    match outcome {
        Ok(report) => {
            info!(
                video_id = %report.video_id,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Processed {}", report.filename
            );
            Ok(Json(ProcessResponse {
                status: "processed",
                video_id: report.video_id.to_string(),
                filename: report.filename,
            }))
        }
        // Logged and counted by the pipeline
        Err(e) => Err(e.into()),
    }
}
