//! S3 API client implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// Custom S3 API endpoint (GCS interoperability, R2, MinIO); AWS when unset
    pub endpoint_url: Option<String>,
    /// Static access key; the default AWS credential chain is used when unset
    pub access_key_id: Option<String>,
    /// Static secret key
    pub secret_access_key: Option<String>,
    /// Region ("auto" works for R2 and GCS)
    pub region: String,
    /// Address buckets as `endpoint/bucket/key`
    pub force_path_style: bool,
    /// Total attempts per request, including the first (1 disables retries)
    pub max_attempts: u32,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Timeout of one whole operation (unbounded when unset)
    pub operation_timeout: Option<Duration>,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            region: "auto".to_string(),
            force_path_style: true,
            max_attempts: 1,
            connect_timeout: Duration::from_secs(5),
            operation_timeout: None,
        }
    }
}

impl ObjectStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let access_key_id = std::env::var("STORAGE_ACCESS_KEY_ID").ok();
        let secret_access_key = std::env::var("STORAGE_SECRET_ACCESS_KEY").ok();
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(StorageError::config_error(
                "STORAGE_ACCESS_KEY_ID and STORAGE_SECRET_ACCESS_KEY must be set together",
            ));
        }

        Ok(Self {
            endpoint_url: std::env::var("STORAGE_ENDPOINT_URL").ok(),
            access_key_id,
            secret_access_key,
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "auto".to_string()),
            force_path_style: std::env::var("STORAGE_FORCE_PATH_STYLE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            max_attempts: std::env::var("STORAGE_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(1),
            connect_timeout: Duration::from_secs(
                std::env::var("STORAGE_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            operation_timeout: std::env::var("STORAGE_OPERATION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
        })
    }
}

/// Object store client speaking the S3 API.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Create a new client from configuration.
    pub async fn new(config: ObjectStoreConfig) -> StorageResult<Self> {
        let mut builder = match (&config.access_key_id, &config.secret_access_key) {
            (Some(key), Some(secret)) => {
                let credentials = Credentials::new(key, secret, None, None, "vproc-static");
                Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials)
            }
            _ => {
                let shared: aws_types::SdkConfig =
                    aws_config::defaults(BehaviorVersion::latest()).load().await;
                Builder::from(&shared)
            }
        };

        let mut timeouts = TimeoutConfig::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.operation_timeout {
            timeouts = timeouts.operation_timeout(timeout);
        }

        builder = builder
            .region(Region::new(config.region))
            .force_path_style(config.force_path_style)
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts))
            .timeout_config(timeouts.build());

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = ObjectStoreConfig::from_env()?;
        Self::new(config).await
    }

    /// Stream an object into a local file, replacing any existing file.
    pub async fn download_file(
        &self,
        bucket: &str,
        key: &str,
        path: impl AsRef<Path>,
    ) -> StorageResult<PathBuf> {
        let path = path.as_ref();
        debug!("Downloading {}/{} to {}", bucket, key, path.display());

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false)
                    || e.raw_response().map(|r| r.status().as_u16()) == Some(404);
                if not_found {
                    StorageError::not_found(format!("{}/{}", bucket, key))
                } else {
                    StorageError::download_failed(DisplayErrorContext(&e).to_string())
                }
            })?;

        let mut file = tokio::fs::File::create(path).await?;
        let mut body = response.body.into_async_read();
        let bytes = tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(|e| StorageError::download_failed(format!("Failed to write {}: {}", path.display(), e)))?;
        file.flush().await?;

        info!("Downloaded {}/{} to {} ({} bytes)", bucket, key, path.display(), bytes);
        Ok(path.to_path_buf())
    }

    /// Upload a local file.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}/{}", path.display(), bucket, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(DisplayErrorContext(&e).to_string()))?;

        info!("Uploaded {} to {}/{}", path.display(), bucket, key);
        Ok(())
    }

    /// Grant public read access to an existing object.
    pub async fn make_public(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .put_object_acl()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| StorageError::publish_failed(format!("{}/{}", bucket, key), DisplayErrorContext(&e).to_string()))?;

        info!("Made {}/{} publicly readable", bucket, key);
        Ok(())
    }

    /// Check connectivity to a bucket.
    pub async fn check_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| {
                StorageError::config_error(format!(
                    "Bucket {} is not reachable: {}",
                    bucket,
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}
