//! End-to-end pipeline tests against in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tempfile::TempDir;
use vproc_models::{IngestJob, Video, VideoId, VideoStatus};
use vproc_storage::StorageError;

use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PipelineError};
use crate::metrics::names;
use crate::pipeline::{JobStage, Pipeline};
use crate::testing::{
    CountingRecorder, FakeTranscode, FakeTranscoder, MemoryObjectStore, MemoryVideoStore,
};

const RAW: &str = "acme-raw-videos";
const PROCESSED: &str = "acme-processed-videos";
const SOURCE: &str = "user123-1700000000.mp4";
const OUTPUT: &str = "processed-user123-1700000000.mp4";

struct Fixture {
    _root: TempDir,
    objects: Arc<MemoryObjectStore>,
    videos: Arc<MemoryVideoStore>,
    transcoder: Arc<FakeTranscoder>,
    pipeline: Pipeline,
}

impl Fixture {
    async fn new(transcoder: FakeTranscoder) -> Self {
        Self::with_config(transcoder, |c| c).await
    }

    async fn with_config(
        transcoder: FakeTranscoder,
        adjust: impl FnOnce(PipelineConfig) -> PipelineConfig,
    ) -> Self {
        let root = TempDir::new().unwrap();
        let config = adjust(
            PipelineConfig::new(RAW, PROCESSED)
                .with_scratch_dirs(root.path().join("raw-videos"), root.path().join("processed-videos")),
        );

        let objects = Arc::new(MemoryObjectStore::new());
        objects.put(RAW, SOURCE, b"raw 1080p bytes".to_vec());
        let videos = Arc::new(MemoryVideoStore::new());
        let transcoder = Arc::new(transcoder);

        let pipeline = Pipeline::new(config, objects.clone(), videos.clone(), transcoder.clone());
        pipeline.prepare().await.unwrap();

        Self {
            _root: root,
            objects,
            videos,
            transcoder,
            pipeline,
        }
    }

    fn video_id(&self) -> VideoId {
        VideoId::from("user123-1700000000")
    }

    fn assert_scratch_empty(&self) {
        let scratch = self.pipeline.scratch();
        assert!(!scratch.intake_path(SOURCE).exists(), "intake file left behind");
        assert!(!scratch.output_path(OUTPUT).exists(), "output file left behind");
    }
}

fn push_body(payload: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "message": {"data": STANDARD.encode(payload.to_string()), "messageId": "9"},
        "subscription": "projects/acme/subscriptions/raw-videos"
    }))
    .unwrap()
}

#[tokio::test]
async fn test_successful_run() {
    let fx = Fixture::new(FakeTranscoder::succeeding()).await;

    let report = fx
        .pipeline
        .handle_push(&push_body(serde_json::json!({"name": SOURCE, "bucket": RAW})))
        .await
        .unwrap();

    assert_eq!(report.video_id, fx.video_id());
    assert_eq!(report.filename, OUTPUT);

    assert_eq!(
        fx.videos.video(&fx.video_id()).unwrap(),
        Video {
            id: Some("user123-1700000000".to_string()),
            uid: Some("user123".to_string()),
            status: Some(VideoStatus::Processed),
            filename: Some(OUTPUT.to_string()),
            ..Default::default()
        }
    );

    let published = fx.objects.get(PROCESSED, OUTPUT).unwrap();
    assert!(published.public);
    assert_eq!(published.bytes, b"360p rendition");
    assert_eq!(fx.transcoder.calls(), 1);
    fx.assert_scratch_empty();
}

#[tokio::test]
async fn test_missing_name_creates_nothing() {
    let fx = Fixture::new(FakeTranscoder::succeeding()).await;

    let err = fx
        .pipeline
        .handle_push(&push_body(serde_json::json!({"bucket": RAW})))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.is_client_fault());
    assert_eq!(fx.videos.writes(), 0);
    assert_eq!(fx.transcoder.calls(), 0);
}

#[tokio::test]
async fn test_repeated_event_is_rejected_without_transcoding() {
    for status in [VideoStatus::Processing, VideoStatus::Processed] {
        let fx = Fixture::new(FakeTranscoder::succeeding()).await;
        fx.videos.insert(
            &fx.video_id(),
            Video {
                status: Some(status),
                ..Video::claim(&fx.video_id())
            },
        );

        let err = fx
            .pipeline
            .handle_push(&push_body(serde_json::json!({"name": SOURCE})))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DuplicateJob);
        assert_eq!(fx.transcoder.calls(), 0);
        assert_eq!(fx.videos.video(&fx.video_id()).unwrap().status, Some(status));
        assert!(fx.objects.keys(PROCESSED).is_empty());
    }
}

#[tokio::test]
async fn test_second_delivery_after_success_is_duplicate() {
    let fx = Fixture::new(FakeTranscoder::succeeding()).await;
    let body = push_body(serde_json::json!({"name": SOURCE}));

    fx.pipeline.handle_push(&body).await.unwrap();
    let err = fx.pipeline.handle_push(&body).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::DuplicateJob { status: Some(VideoStatus::Processed), .. }
    ));
    assert_eq!(fx.transcoder.calls(), 1);
}

#[tokio::test]
async fn test_transcode_failure_leaves_status_processing() {
    let fx = Fixture::new(FakeTranscoder::failing("moov atom not found")).await;

    let err = fx
        .pipeline
        .handle_job(IngestJob::from_source_name(SOURCE).unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transcode);
    assert_eq!(err.stage(), Some(JobStage::Converting));
    let PipelineError::JobFailed { source, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    let PipelineError::Transcode(media) = source.as_ref() else {
        panic!("unexpected source: {source}");
    };
    assert_eq!(media.diagnostic(), Some("moov atom not found"));

    assert!(fx.objects.get(PROCESSED, OUTPUT).is_none());
    assert_eq!(
        fx.videos.video(&fx.video_id()).unwrap().status,
        Some(VideoStatus::Processing)
    );
    fx.assert_scratch_empty();
}

#[tokio::test]
async fn test_missing_source_object_fails_at_download() {
    let fx = Fixture::new(FakeTranscoder::succeeding()).await;

    let err = fx
        .pipeline
        .handle_job(IngestJob::from_source_name("user123-1.mp4").unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Store);
    assert_eq!(err.stage(), Some(JobStage::Downloading));
    assert_eq!(fx.transcoder.calls(), 0);
    assert!(!fx.pipeline.scratch().intake_path("user123-1.mp4").exists());
}

#[tokio::test]
async fn test_upload_failure_cleans_up() {
    let fx = Fixture::new(FakeTranscoder::succeeding()).await;
    fx.objects.fail_uploads();

    let err = fx
        .pipeline
        .handle_job(IngestJob::from_source_name(SOURCE).unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Store);
    assert_eq!(err.stage(), Some(JobStage::Uploading));
    assert_eq!(
        fx.videos.video(&fx.video_id()).unwrap().status,
        Some(VideoStatus::Processing)
    );
    fx.assert_scratch_empty();
}

#[tokio::test]
async fn test_publish_failure_leaves_private_object() {
    let fx = Fixture::new(FakeTranscoder::succeeding()).await;
    fx.objects.fail_publish();

    let err = fx
        .pipeline
        .handle_job(IngestJob::from_source_name(SOURCE).unwrap())
        .await
        .unwrap_err();

    let PipelineError::JobFailed { source, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert!(matches!(**source, PipelineError::Storage(StorageError::PublishFailed { .. })));
    assert!(!fx.objects.get(PROCESSED, OUTPUT).unwrap().public);
    fx.assert_scratch_empty();
}

#[tokio::test]
async fn test_status_update_failure_is_store_error() {
    let fx = Fixture::new(FakeTranscoder::succeeding()).await;
    let job = IngestJob::from_source_name(SOURCE).unwrap();

    // Claimed elsewhere; the store goes away before the final write.
    fx.videos.set_unavailable(true);
    let err = fx.pipeline.run(job).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Store);
    assert_eq!(err.stage(), Some(JobStage::UpdatingStatus));
    assert!(fx.objects.get(PROCESSED, OUTPUT).unwrap().public);
    fx.assert_scratch_empty();
}

#[tokio::test]
async fn test_store_unreachable_aborts_before_download() {
    let recorder = CountingRecorder::new();
    let _metrics = metrics::set_default_local_recorder(&recorder);

    let fx = Fixture::new(FakeTranscoder::succeeding()).await;
    fx.videos.set_unavailable(true);

    let err = fx
        .pipeline
        .handle_push(&push_body(serde_json::json!({"name": SOURCE})))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Store);
    assert!(!err.is_client_fault());
    assert_eq!(fx.transcoder.calls(), 0);
    assert!(!fx.pipeline.scratch().intake_path(SOURCE).exists());

    // A failed claim is a failed job, not a rejected event.
    assert_eq!(
        recorder.counter(
            names::JOBS_FAILED_TOTAL,
            &[("kind", "store"), ("stage", "validating")]
        ),
        1
    );
    assert_eq!(recorder.counter(names::JOBS_REJECTED_TOTAL, &[]), 0);
}

#[tokio::test]
async fn test_rejections_are_counted_by_kind() {
    let recorder = CountingRecorder::new();
    let _metrics = metrics::set_default_local_recorder(&recorder);

    let fx = Fixture::new(FakeTranscoder::succeeding()).await;
    fx.videos.insert(&fx.video_id(), Video::claim(&fx.video_id()));

    fx.pipeline
        .handle_push(&push_body(serde_json::json!({"bucket": RAW})))
        .await
        .unwrap_err();
    fx.pipeline
        .handle_push(&push_body(serde_json::json!({"name": SOURCE})))
        .await
        .unwrap_err();

    assert_eq!(recorder.counter(names::JOBS_REJECTED_TOTAL, &[("kind", "validation")]), 1);
    assert_eq!(recorder.counter(names::JOBS_REJECTED_TOTAL, &[("kind", "duplicate_job")]), 1);
    assert_eq!(recorder.counter(names::JOBS_FAILED_TOTAL, &[]), 0);
}

#[tokio::test]
async fn test_cleanup_failure_keeps_job_result() {
    let recorder = CountingRecorder::new();
    let _metrics = metrics::set_default_local_recorder(&recorder);

    let fx = Fixture::new(FakeTranscoder::failing("Conversion failed!")).await;
    // A directory where the rendition would go cannot be removed as a file.
    let blocked = fx.pipeline.scratch().output_path(OUTPUT);
    std::fs::create_dir(&blocked).unwrap();

    let err = fx
        .pipeline
        .handle_job(IngestJob::from_source_name(SOURCE).unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transcode);
    assert_eq!(err.stage(), Some(JobStage::Converting));
    assert_eq!(recorder.counter(names::CLEANUP_FAILURES_TOTAL, &[]), 1);
    assert_eq!(
        recorder.counter(names::JOBS_FAILED_TOTAL, &[("kind", "transcode")]),
        1
    );
    // The other scratch file is still removed.
    assert!(!fx.pipeline.scratch().intake_path(SOURCE).exists());
    assert!(blocked.is_dir());
}

#[tokio::test]
async fn test_success_counts_no_cleanup_failure() {
    let recorder = CountingRecorder::new();
    let _metrics = metrics::set_default_local_recorder(&recorder);

    let fx = Fixture::new(FakeTranscoder::succeeding()).await;
    fx.pipeline
        .handle_job(IngestJob::from_source_name(SOURCE).unwrap())
        .await
        .unwrap();

    assert_eq!(recorder.counter(names::JOBS_COMPLETED_TOTAL, &[]), 1);
    assert_eq!(recorder.counter(names::CLEANUP_FAILURES_TOTAL, &[]), 0);
}

#[tokio::test]
async fn test_concurrent_claims_admit_one() {
    let fx = Fixture::new(FakeTranscoder::succeeding()).await;
    let body = push_body(serde_json::json!({"name": SOURCE}));

    let (first, second) = tokio::join!(fx.pipeline.handle_push(&body), fx.pipeline.handle_push(&body));

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let rejected = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(rejected.kind(), ErrorKind::DuplicateJob);
    assert_eq!(fx.transcoder.calls(), 1);
}

#[tokio::test]
async fn test_existing_title_survives() {
    let fx = Fixture::new(FakeTranscoder::succeeding()).await;
    fx.videos.insert(
        &fx.video_id(),
        Video {
            title: Some("Summer trip".to_string()),
            description: Some("Beach day".to_string()),
            ..Default::default()
        },
    );

    fx.pipeline
        .handle_push(&push_body(serde_json::json!({"name": SOURCE})))
        .await
        .unwrap();

    let video = fx.videos.video(&fx.video_id()).unwrap();
    assert_eq!(video.title.as_deref(), Some("Summer trip"));
    assert_eq!(video.description.as_deref(), Some("Beach day"));
    assert_eq!(video.status, Some(VideoStatus::Processed));
    assert_eq!(video.uid.as_deref(), Some("user123"));
}

#[tokio::test]
async fn test_step_timeout_stops_encoder() {
    let fx = Fixture::with_config(FakeTranscoder::new(FakeTranscode::Hang), |c| {
        c.with_step_timeout(Duration::from_millis(50))
    })
    .await;

    let err = fx
        .pipeline
        .handle_job(IngestJob::from_source_name(SOURCE).unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transcode);
    assert_eq!(err.stage(), Some(JobStage::Converting));

    // The fake notices the dropped handle on its own task.
    for _ in 0..50 {
        if fx.transcoder.was_abandoned() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(fx.transcoder.was_abandoned());
    fx.assert_scratch_empty();
}

#[tokio::test]
async fn test_cancelled_job_still_cleans_up() {
    let fx = Fixture::new(FakeTranscoder::new(FakeTranscode::Hang)).await;
    let job = IngestJob::from_source_name(SOURCE).unwrap();

    let result = tokio::time::timeout(Duration::from_millis(100), fx.pipeline.handle_job(job)).await;

    assert!(result.is_err(), "job should still be converting");
    fx.assert_scratch_empty();
}
