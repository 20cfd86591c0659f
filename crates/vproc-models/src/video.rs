//! Video job record models.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a video job: the source filename without its extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owner identifier: the portion of the id before its first `-`.
    pub fn uid(&self) -> &str {
        self.0.split('-').next().unwrap_or_default()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Video processing status.
///
/// A record with no status has never been claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Claimed by a worker, rendition not yet published
    Processing,
    /// Rendition published
    Processed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Processing => "processing",
            VideoStatus::Processed => "processed",
        }
    }

    /// Parse the stored string form. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(VideoStatus::Processing),
            "processed" => Some(VideoStatus::Processed),
            _ => None,
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Video record stored in the `videos` collection.
///
/// Every field is optional: a write only touches the fields that are set,
/// leaving the rest of the stored document as it was.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Owner identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Name of the published rendition (set once processed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<VideoStatus>,

    /// Set by other collaborators, never by the pipeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Set by other collaborators, never by the pipeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Video {
    /// Record written when a job is first claimed.
    pub fn claim(video_id: &VideoId) -> Self {
        Self {
            id: Some(video_id.to_string()),
            uid: Some(video_id.uid().to_string()),
            status: Some(VideoStatus::Processing),
            ..Default::default()
        }
    }

    /// Record written once the rendition has been published.
    pub fn processed(filename: impl Into<String>) -> Self {
        Self {
            status: Some(VideoStatus::Processed),
            filename: Some(filename.into()),
            ..Default::default()
        }
    }

    /// A record without a status has not been claimed yet.
    pub fn is_new(&self) -> bool {
        self.status.is_none()
    }

    /// Overlay the set fields of `patch` onto this record.
    pub fn merge(&mut self, patch: &Video) {
        fn take(dst: &mut Option<String>, src: &Option<String>) {
            if src.is_some() {
                dst.clone_from(src);
            }
        }

        take(&mut self.id, &patch.id);
        take(&mut self.uid, &patch.uid);
        take(&mut self.filename, &patch.filename);
        take(&mut self.title, &patch.title);
        take(&mut self.description, &patch.description);
        if patch.status.is_some() {
            self.status = patch.status;
        }
    }

    /// Names of the fields that are set, in document field order.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.id.is_some() {
            names.push("id");
        }
        if self.uid.is_some() {
            names.push("uid");
        }
        if self.filename.is_some() {
            names.push("filename");
        }
        if self.status.is_some() {
            names.push("status");
        }
        if self.title.is_some() {
            names.push("title");
        }
        if self.description.is_some() {
            names.push("description");
        }
        names
    }
}
