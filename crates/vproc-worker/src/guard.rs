//! Duplicate guard.
//!
//! Claims a job by writing `status: processing` to its video record before
//! any work starts. The write is conditional on the record being exactly as
//! it was read, so of two deliveries racing for the same video only one
//! gets through.

use std::sync::Arc;

use tracing::{debug, info};
use vproc_firestore::{VideoStore, WritePrecondition};
use vproc_models::{IngestJob, Video};

use crate::error::{PipelineError, PipelineResult};

#[derive(Clone)]
pub struct DuplicateGuard {
    videos: Arc<dyn VideoStore>,
}

impl DuplicateGuard {
    pub fn new(videos: Arc<dyn VideoStore>) -> Self {
        Self { videos }
    }

    /// Claim `job` for this worker.
    ///
    /// Fails with [`PipelineError::DuplicateJob`] if the record already has a
    /// status or another delivery claimed it first. Fields the pipeline does
    /// not own (such as `title`) are preserved.
    pub async fn claim(&self, job: &IngestJob) -> PipelineResult<()> {
        let video_id = &job.video_id;

        let precondition = match self.videos.get_video(video_id).await? {
            None => WritePrecondition::Absent,
            Some(snapshot) if !snapshot.video.is_new() => {
                debug!("Video {} already has status {:?}", video_id, snapshot.video.status);
                return Err(PipelineError::duplicate(video_id.clone(), snapshot.video.status));
            }
            Some(snapshot) => snapshot.unchanged()?,
        };

        match self
            .videos
            .set_video_if(video_id, &Video::claim(video_id), &precondition)
            .await
        {
            Ok(()) => {
                info!("Claimed video {} (uid {})", video_id, job.uid());
                Ok(())
            }
            Err(e) if e.is_precondition_failed() => {
                info!("Video {} was claimed concurrently", video_id);
                Err(PipelineError::duplicate(video_id.clone(), None))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use mockall::predicate::eq;
    use vproc_firestore::{FirestoreError, MockVideoStore, VideoSnapshot};
    use vproc_models::{VideoId, VideoStatus};

    fn job() -> IngestJob {
        IngestJob::from_source_name("user123-1700000000.mp4").unwrap()
    }

    fn snapshot(video: Video) -> VideoSnapshot {
        VideoSnapshot {
            video,
            update_time: Some("2024-05-01T10:00:00.000001Z".to_string()),
        }
    }

    fn guard(store: MockVideoStore) -> DuplicateGuard {
        DuplicateGuard::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_new_video_is_claimed_if_absent() {
        let mut store = MockVideoStore::new();
        store.expect_get_video().times(1).returning(|_| Ok(None));
        store
            .expect_set_video_if()
            .withf(|id, video, precondition| {
                id.as_str() == "user123-1700000000"
                    && *video == Video::claim(id)
                    && *precondition == WritePrecondition::Absent
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        guard(store).claim(&job()).await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_record_without_status_is_claimed_at_its_version() {
        let mut store = MockVideoStore::new();
        store
            .expect_get_video()
            .with(eq(VideoId::from("user123-1700000000")))
            .returning(|_| {
                Ok(Some(snapshot(Video {
                    title: Some("Holiday".to_string()),
                    ..Default::default()
                })))
            });
        store
            .expect_set_video_if()
            .withf(|_, video, precondition| {
                video.title.is_none()
                    && *precondition
                        == WritePrecondition::UnchangedSince("2024-05-01T10:00:00.000001Z".to_string())
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        guard(store).claim(&job()).await.unwrap();
    }

    #[tokio::test]
    async fn test_processing_or_processed_is_duplicate() {
        for status in [VideoStatus::Processing, VideoStatus::Processed] {
            let mut store = MockVideoStore::new();
            store.expect_get_video().returning(move |id| {
                Ok(Some(snapshot(Video {
                    status: Some(status),
                    ..Video::claim(id)
                })))
            });
            store.expect_set_video_if().never();

            let err = guard(store).claim(&job()).await.unwrap_err();
            assert!(
                matches!(err, PipelineError::DuplicateJob { status: Some(s), .. } if s == status),
                "got {err}"
            );
        }
    }

    #[tokio::test]
    async fn test_lost_race_is_duplicate() {
        let mut store = MockVideoStore::new();
        store.expect_get_video().returning(|_| Ok(None));
        store
            .expect_set_video_if()
            .returning(|_, _, _| Err(FirestoreError::PreconditionFailed("exists".into())));

        let err = guard(store).claim(&job()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateJob);
    }

    #[tokio::test]
    async fn test_store_unreachable_is_store_error() {
        let mut store = MockVideoStore::new();
        store
            .expect_get_video()
            .returning(|_| Err(FirestoreError::ServerError(503, "unavailable".into())));
        store.expect_set_video_if().never();

        let err = guard(store).claim(&job()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
    }
}
