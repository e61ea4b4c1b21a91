//! Access-token cache shared by the storage and Vertex clients.
//!
//! One token per cache, refreshed ahead of expiry behind a write lock so
//! concurrent requests never stampede the auth backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

/// OAuth scope for Cloud Storage and Vertex AI access.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

// Refresh a minute early so a token never expires mid-request.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

struct Entry {
    token: String,
    expires_at: Instant,
}

/// Caches the access token for one scope.
pub struct TokenCache {
    auth: Arc<dyn TokenProvider>,
    scope: &'static str,
    entry: RwLock<Option<Entry>>,
}

impl TokenCache {
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self::with_scope(auth, CLOUD_PLATFORM_SCOPE)
    }

    /// Cache tokens for a non-default scope.
    pub fn with_scope(auth: Arc<dyn TokenProvider>, scope: &'static str) -> Self {
        Self {
            auth,
            scope,
            entry: RwLock::new(None),
        }
    }

    /// Current access token, refreshed when it is within the margin of
    /// expiry. When a refresh fails but the held token has life left, the
    /// held token is returned instead of the error.
    pub async fn get_token(&self) -> StorageResult<String> {
        {
            let entry = self.entry.read().await;
            if let Some(token) = fresh(entry.as_ref()) {
                return Ok(token);
            }
        }

        let mut entry = self.entry.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = fresh(entry.as_ref()) {
            return Ok(token);
        }

        match self.auth.token(&[self.scope]).await {
            Ok(token) => {
                let refreshed = Entry {
                    token: token.as_str().to_string(),
                    expires_at: Instant::now() + remaining_ttl(token.expires_at()),
                };
                let out = refreshed.token.clone();
                *entry = Some(refreshed);
                debug!(scope = self.scope, "Refreshed access token");
                Ok(out)
            }
            Err(e) => match entry.as_ref() {
                Some(held) if Instant::now() < held.expires_at => {
                    warn!("Token refresh failed, reusing held token: {}", e);
                    Ok(held.token.clone())
                }
                _ => Err(StorageError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                ))),
            },
        }
    }

    /// Drop the cached token so the next request refreshes.
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}

fn fresh(entry: Option<&Entry>) -> Option<String> {
    entry.and_then(|e| {
        (Instant::now() + REFRESH_MARGIN < e.expires_at).then(|| e.token.clone())
    })
}

/// Lifetime left on a token; an already-expired timestamp yields zero so the
/// next request refreshes immediately.
fn remaining_ttl(expires_at: chrono::DateTime<chrono::Utc>) -> Duration {
    (expires_at - chrono::Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_is_cloud_platform() {
        assert!(CLOUD_PLATFORM_SCOPE.contains("cloud-platform"));
    }

    #[test]
    fn expired_timestamps_yield_zero_ttl() {
        let past = chrono::Utc::now() - chrono::Duration::seconds(30);
        assert_eq!(remaining_ttl(past), Duration::ZERO);
    }

    #[test]
    fn future_expiry_keeps_its_lifetime() {
        let future = chrono::Utc::now() + chrono::Duration::seconds(600);
        let ttl = remaining_ttl(future);
        assert!(ttl > Duration::from_secs(590));
        assert!(ttl <= Duration::from_secs(600));
    }

    #[test]
    fn entries_inside_the_margin_are_not_fresh() {
        let soon = Entry {
            token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(10),
        };
        assert!(fresh(Some(&soon)).is_none());

        let later = Entry {
            token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(600),
        };
        assert_eq!(fresh(Some(&later)).as_deref(), Some("t"));
        assert!(fresh(None).is_none());
    }
}
