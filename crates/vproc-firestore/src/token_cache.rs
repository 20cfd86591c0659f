//! Access token cache for Firestore requests.
//!
//! Tokens are refreshed a minute before they expire. Refresh happens under
//! the write lock so concurrent requests trigger a single fetch. If a refresh
//! fails while the previous token is still technically valid, that token is
//! used rather than failing the request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// OAuth scope granting Firestore REST access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }

    fn unexpired(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Shared bearer token cache.
pub struct TokenCache {
    provider: Arc<dyn TokenProvider>,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            cached: RwLock::new(None),
        }
    }

    /// Forget the cached token, forcing a refresh on next use.
    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }

    /// Current bearer token.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        if let Some(token) = self.cached.read().await.as_ref().filter(|t| t.fresh()) {
            return Ok(token.value.clone());
        }

        let mut slot = self.cached.write().await;
        if let Some(token) = slot.as_ref().filter(|t| t.fresh()) {
            return Ok(token.value.clone());
        }

        match self.provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                // An already-expired token is cached with no lifetime so the
                // next request refreshes again.
                let ttl = (token.expires_at() - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);

                let value = token.as_str().to_string();
                *slot = Some(CachedToken {
                    value: value.clone(),
                    expires_at: Instant::now() + ttl,
                });
                debug!("Refreshed Firestore access token, valid for {}s", ttl.as_secs());
                Ok(value)
            }
            Err(e) => match slot.as_ref().filter(|t| t.unexpired()) {
                Some(stale) => {
                    warn!("Token refresh failed, reusing current token: {}", e);
                    Ok(stale.value.clone())
                }
                None => Err(FirestoreError::auth_error(format!(
                    "Failed to obtain access token: {}",
                    e
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_freshness() {
        let soon = CachedToken {
            value: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(!soon.fresh());
        assert!(soon.unexpired());

        let later = CachedToken {
            value: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(600),
        };
        assert!(later.fresh());
    }

    #[test]
    fn test_scope() {
        assert!(FIRESTORE_SCOPE.ends_with("/datastore"));
    }
}
