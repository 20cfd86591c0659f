//! Object store capability used by the pipeline.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::client::S3ObjectStore;
use crate::error::StorageResult;

/// Fetches raw objects and publishes renditions.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `bucket/key` into `destination`, returning the local path.
    async fn fetch(&self, bucket: &str, key: &str, destination: &Path) -> StorageResult<PathBuf>;

    /// Upload `source` to `bucket/key`, then make the object publicly readable.
    ///
    /// The two phases are separate requests: when the second fails the object
    /// stays uploaded but private and `StorageError::PublishFailed` is returned.
    async fn store(&self, source: &Path, bucket: &str, key: &str) -> StorageResult<()>;
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn fetch(&self, bucket: &str, key: &str, destination: &Path) -> StorageResult<PathBuf> {
        self.download_file(bucket, key, destination).await
    }

    async fn store(&self, source: &Path, bucket: &str, key: &str) -> StorageResult<()> {
        self.upload_file(source, bucket, key, content_type_for(key)).await?;
        self.make_public(bucket, key).await
    }
}

/// Content type for a video object, from its extension.
pub fn content_type_for(key: &str) -> &'static str {
    let extension = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ObjectStoreConfig;
    use crate::error::StorageError;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store_for(server: &MockServer) -> S3ObjectStore {
        S3ObjectStore::new(ObjectStoreConfig {
            endpoint_url: Some(server.uri()),
            access_key_id: Some("test".to_string()),
            secret_access_key: Some("test".to_string()),
            region: "us-east-1".to_string(),
            force_path_style: true,
            max_attempts: 1,
            connect_timeout: Duration::from_secs(2),
            operation_timeout: Some(Duration::from_secs(10)),
        })
        .await
        .unwrap()
    }

    fn s3_error(code: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>{}</Code><Message>test</Message></Error>",
            code
        )
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("processed-u-1.mp4"), "video/mp4");
        assert_eq!(content_type_for("clip.MOV"), "video/quicktime");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_fetch_streams_object_to_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/raw-videos/user123-1700000000.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"raw video bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("user123-1700000000.mp4");
        let store = store_for(&server).await;

        let local = store
            .fetch("raw-videos", "user123-1700000000.mp4", &destination)
            .await
            .unwrap();

        assert_eq!(local, destination);
        assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"raw video bytes");
    }

    #[tokio::test]
    async fn test_fetch_missing_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/raw-videos/missing.mp4"))
            .respond_with(ResponseTemplate::new(404).set_body_string(s3_error("NoSuchKey")))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = store_for(&server)
            .await
            .fetch("raw-videos", "missing.mp4", &dir.path().join("missing.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::NotFound(_)), "got {err}");
    }

    #[tokio::test]
    async fn test_store_uploads_then_makes_public() {
        let server = MockServer::start().await;
        // Registered first so ACL requests never fall through to the upload mock.
        Mock::given(method("PUT"))
            .and(path("/processed-videos/processed-a.mp4"))
            .and(query_param("acl", ""))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/processed-videos/processed-a.mp4"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let source = dir.path().join("processed-a.mp4");
        tokio::fs::write(&source, b"rendition").await.unwrap();

        store_for(&server)
            .await
            .store(&source, "processed-videos", "processed-a.mp4")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_store_reports_private_object_when_acl_fails() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/processed-videos/processed-a.mp4"))
            .and(query_param("acl", ""))
            .respond_with(ResponseTemplate::new(403).set_body_string(s3_error("AccessDenied")))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/processed-videos/processed-a.mp4"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let source = dir.path().join("processed-a.mp4");
        tokio::fs::write(&source, b"rendition").await.unwrap();

        let err = store_for(&server)
            .await
            .store(&source, "processed-videos", "processed-a.mp4")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::PublishFailed { .. }), "got {err}");
    }
}
