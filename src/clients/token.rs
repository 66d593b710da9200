use crate::error::SourceError;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Upper bound on a granted token lifetime (one year)
const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// Token endpoint response of an OAuth2 client-credentials grant
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Caches one bearer token and refreshes it lazily once it expires.
///
/// The cache lock is held while a new token is requested, so concurrent
/// callers wait for that single request instead of issuing their own.
#[derive(Debug, Default)]
pub struct TokenManager {
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token while `now < expires_at`, otherwise run
    /// `acquire` once and cache its grant.
    pub async fn access_token<F, Fut>(&self, acquire: F) -> Result<String, SourceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenGrant, SourceError>>,
    {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if Utc::now() < token.expires_at {
                debug!("Reusing cached access token");
                return Ok(token.access_token.clone());
            }
        }

        let grant = acquire().await?;
        let expires_at = Utc::now() + Duration::seconds(grant.expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS));

        info!(%expires_at, "Access token refreshed");

        *cached = Some(CachedToken {
            access_token: grant.access_token.clone(),
            expires_at,
        });

        Ok(grant.access_token)
    }
}
