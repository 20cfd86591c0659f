//! Firestore REST API client.
//!
//! - Token caching with refresh margin, and a single re-send after an
//!   expired-token 401
//! - HTTP client tuning (pooling, timeouts)
//! - Opt-in retry of transient failures
//! - Observability (tracing spans, metrics)
//! - Emulator support through `FIRESTORE_EMULATOR_HOST`

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::{record_precondition_conflict, record_request};
use crate::retry::{with_retry, RetryConfig};
use crate::token_cache::TokenCache;
use crate::types::{Document, Precondition, Value};

const PRODUCTION_ENDPOINT: &str = "https://firestore.googleapis.com/v1";

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
    /// `host:port` of a Firestore emulator; requests are then sent over
    /// plain HTTP without credentials
    pub emulator_host: Option<String>,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let secs = |name: &str, default: u64| {
            Duration::from_secs(
                std::env::var(name)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default),
            )
        };

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            timeout: secs("FIRESTORE_TIMEOUT_SECS", 30),
            connect_timeout: secs("FIRESTORE_CONNECT_TIMEOUT_SECS", 5),
            retry: RetryConfig::from_env(),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
        })
    }
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    /// `None` when talking to the emulator
    tokens: Option<Arc<TokenCache>>,
}

impl FirestoreClient {
    /// Create a new Firestore client.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("vproc-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        let (endpoint, tokens) = match &config.emulator_host {
            Some(host) => {
                info!("Using Firestore emulator at {}", host);
                let host = host.trim_end_matches('/');
                let endpoint = if host.starts_with("http://") || host.starts_with("https://") {
                    format!("{}/v1", host)
                } else {
                    format!("http://{}/v1", host)
                };
                (endpoint, None)
            }
            None => {
                let provider = Self::create_auth_provider().await?;
                (
                    PRODUCTION_ENDPOINT.to_string(),
                    Some(Arc::new(TokenCache::new(provider))),
                )
            }
        };

        let base_url = format!(
            "{}/projects/{}/databases/{}/documents",
            endpoint, config.project_id, config.database_id
        );

        Ok(Self {
            http,
            config,
            base_url,
            tokens,
        })
    }

    /// Explicit service account key first, then Application Default Credentials.
    async fn create_auth_provider() -> FirestoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            FirestoreError::auth_error(format!("Failed to load service account: {}", e))
        })?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => gcp_auth::provider().await.map_err(|e| {
                FirestoreError::auth_error(format!(
                    "No Google credentials found (set GOOGLE_APPLICATION_CREDENTIALS): {}",
                    e
                ))
            }),
        }
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        let config = FirestoreConfig::from_env()?;
        Self::new(config).await
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        )
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    /// Get a document. A missing document is `Ok(None)`.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);
        let url = url.as_str();

        self.execute_request("get_document", collection, doc_id, || async move {
            let response = self.send(|http| http.get(url)).await?;
            match response.status() {
                StatusCode::OK => Ok(Some(response.json::<Document>().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    /// Write `fields` into a document, creating it if needed.
    ///
    /// With an `update_mask` only the listed fields are replaced and every
    /// other stored field is kept. A `precondition` the document does not
    /// satisfy fails with [`FirestoreError::PreconditionFailed`].
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
        precondition: Option<&Precondition>,
    ) -> FirestoreResult<Document> {
        let mut params: Vec<String> = update_mask
            .iter()
            .flatten()
            .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
            .collect();
        if let Some(precondition) = precondition {
            params.extend(precondition.to_query_params());
        }

        let mut url = self.document_path(collection, doc_id);
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }
        let url = url.as_str();
        let body = Document::new(fields);
        let body = &body;

        let result = self
            .execute_request("update_document", collection, doc_id, || async move {
                let response = self.send(|http| http.patch(url).json(body)).await?;
                match response.status() {
                    StatusCode::OK => Ok(response.json::<Document>().await?),
                    status => Err(Self::handle_error_response(status, url, response).await),
                }
            })
            .await;

        match result {
            // `exists=false` against an existing document is reported as 409.
            Err(FirestoreError::AlreadyExists(msg)) if precondition.is_some() => {
                record_precondition_conflict(collection);
                Err(FirestoreError::PreconditionFailed(msg))
            }
            Err(e) if e.is_precondition_failed() => {
                record_precondition_conflict(collection);
                Err(e)
            }
            other => other,
        }
    }

    /// Send a request, attaching a bearer token unless talking to the emulator.
    ///
    /// A 401 caused by an expired token invalidates the cache and the request
    /// is sent once more with a fresh token.
    async fn send<F>(&self, build: F) -> FirestoreResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let Some(tokens) = &self.tokens else {
            return Ok(build(&self.http).send().await?);
        };

        let token = tokens.get_token().await?;
        let response = build(&self.http).bearer_auth(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(FirestoreError::from_http_status(401, body));
        }

        debug!("Firestore access token expired, refreshing");
        tokens.invalidate().await;
        let token = tokens.get_token().await?;
        Ok(build(&self.http).bearer_auth(&token).send().await?)
    }

    /// Run one logical request (with any retries) inside a span, recording metrics.
    async fn execute_request<T, F, Fut>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: &str,
        op: F,
    ) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        let span = info_span!(
            "firestore_request",
            operation = %operation,
            collection = %collection,
            doc_id = %doc_id
        );

        let start = Instant::now();
        let result = with_retry(&self.config.retry, operation, op)
            .instrument(span)
            .await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn handle_error_response(status: StatusCode, url: &str, response: Response) -> FirestoreError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            if let Some(secs) = retry_after {
                return FirestoreError::RateLimited(secs.saturating_mul(1000));
            }
        }

        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}
