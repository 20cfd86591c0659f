//! Video record repository.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, info};
use vproc_models::{Video, VideoId, VideoStatus};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, Precondition, ToFirestoreValue, Value};

/// Collection holding one document per video job.
pub const DEFAULT_VIDEOS_COLLECTION: &str = "videos";

/// A stored video record together with its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSnapshot {
    pub video: Video,
    /// Server time of the last write
    pub update_time: Option<String>,
}

impl VideoSnapshot {
    /// Precondition that holds only while the record is unchanged.
    pub fn unchanged(&self) -> FirestoreResult<WritePrecondition> {
        self.update_time
            .clone()
            .map(WritePrecondition::UnchangedSince)
            .ok_or_else(|| FirestoreError::invalid_document("stored video has no updateTime"))
    }
}

/// State the stored record must be in for a conditional write to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePrecondition {
    /// No record exists yet
    Absent,
    /// The record was last written at this time
    UnchangedSince(String),
}

impl WritePrecondition {
    fn to_precondition(&self) -> Precondition {
        match self {
            WritePrecondition::Absent => Precondition::exists(false),
            WritePrecondition::UnchangedSince(ts) => Precondition::update_time(ts.clone()),
        }
    }
}

/// Keyed store of video records.
///
/// Writes merge: only the fields set on the given [`Video`] are written,
/// any other stored field is left untouched.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Read a record. A missing record is `Ok(None)`.
    async fn get_video(&self, video_id: &VideoId) -> FirestoreResult<Option<VideoSnapshot>>;

    /// Merge-write a record, creating it if needed.
    async fn set_video(&self, video_id: &VideoId, video: &Video) -> FirestoreResult<()>;

    /// Merge-write a record only if `precondition` holds.
    ///
    /// Fails with [`FirestoreError::PreconditionFailed`] when it does not.
    async fn set_video_if(
        &self,
        video_id: &VideoId,
        video: &Video,
        precondition: &WritePrecondition,
    ) -> FirestoreResult<()>;
}

/// Firestore-backed [`VideoStore`].
#[derive(Clone)]
pub struct VideoRepository {
    client: FirestoreClient,
    collection: String,
}

impl VideoRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            client,
            collection: DEFAULT_VIDEOS_COLLECTION.to_string(),
        }
    }

    /// Use a different collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Create from environment variables (`FIRESTORE_VIDEOS_COLLECTION`).
    pub async fn from_env() -> FirestoreResult<Self> {
        let client = FirestoreClient::from_env().await?;
        let repo = Self::new(client);
        Ok(match std::env::var("FIRESTORE_VIDEOS_COLLECTION") {
            Ok(collection) if !collection.is_empty() => repo.with_collection(collection),
            _ => repo,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn write(
        &self,
        video_id: &VideoId,
        video: &Video,
        precondition: Option<&WritePrecondition>,
    ) -> FirestoreResult<()> {
        let (fields, mask) = video_to_fields(video);
        let precondition = precondition.map(WritePrecondition::to_precondition);

        self.client
            .update_document(
                &self.collection,
                video_id.as_str(),
                fields,
                Some(mask),
                precondition.as_ref(),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VideoStore for VideoRepository {
    async fn get_video(&self, video_id: &VideoId) -> FirestoreResult<Option<VideoSnapshot>> {
        let doc = self
            .client
            .get_document(&self.collection, video_id.as_str())
            .await?;

        match doc {
            Some(d) => {
                let video = document_to_video(&d)?;
                debug!("Loaded video record {} (status {:?})", video_id, video.status);
                Ok(Some(VideoSnapshot {
                    video,
                    update_time: d.update_time,
                }))
            }
            None => Ok(None),
        }
    }

    async fn set_video(&self, video_id: &VideoId, video: &Video) -> FirestoreResult<()> {
        self.write(video_id, video, None).await?;
        info!("Updated video record {}: {:?}", video_id, video.field_names());
        Ok(())
    }

    async fn set_video_if(
        &self,
        video_id: &VideoId,
        video: &Video,
        precondition: &WritePrecondition,
    ) -> FirestoreResult<()> {
        self.write(video_id, video, Some(precondition)).await?;
        info!(
            "Updated video record {} ({:?}): {:?}",
            video_id,
            precondition,
            video.field_names()
        );
        Ok(())
    }
}

/// Fields to write and the matching update mask.
fn video_to_fields(video: &Video) -> (HashMap<String, Value>, Vec<String>) {
    let mut fields = HashMap::new();
    let mut put = |name: &str, value: &Option<String>| {
        if let Some(v) = value {
            fields.insert(name.to_string(), v.to_firestore_value());
        }
    };

    put("id", &video.id);
    put("uid", &video.uid);
    put("filename", &video.filename);
    put("title", &video.title);
    put("description", &video.description);
    if let Some(status) = video.status {
        fields.insert("status".to_string(), status.as_str().to_firestore_value());
    }

    let mask = video.field_names().into_iter().map(String::from).collect();
    (fields, mask)
}

/// Read a stored record. A null `status` counts as unset; a status this
/// service does not know is rejected rather than treated as new.
fn document_to_video(doc: &Document) -> FirestoreResult<Video> {
    let status = match doc.fields.as_ref().and_then(|f| f.get("status")) {
        None | Some(Value::NullValue(())) => None,
        Some(Value::StringValue(s)) => Some(VideoStatus::parse(s).ok_or_else(|| {
            FirestoreError::invalid_document(format!("unknown video status '{}'", s))
        })?),
        Some(other) => {
            return Err(FirestoreError::invalid_document(format!(
                "video status is not a string: {:?}",
                other
            )))
        }
    };

    Ok(Video {
        id: doc.get("id"),
        uid: doc.get("uid"),
        filename: doc.get("filename"),
        status,
        title: doc.get("title"),
        description: doc.get("description"),
    })
}
