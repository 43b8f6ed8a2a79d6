//! Credential lifecycle manager
//!
//! Owns the one shared Fyers credential for the whole deployment. Sessions
//! and REST handlers ask for a valid access token; the manager transparently
//! refreshes an expired one, with a single-flight mutex so concurrent
//! callers share one refresh outcome instead of racing the rate-limited
//! token endpoint.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::database::models::{AccessToken, NewAccessToken};
use crate::database::repositories::TokenRepository;
use crate::database::DatabaseError;
use crate::fyers::auth_api::{FyersAuthClient, TokenGrant};

use super::errors::AuthError;

/// Safety margin before expiry; a token inside this window is treated as
/// already expired so it cannot lapse between the validity check and use
pub const TOKEN_GRACE_PERIOD_MINUTES: i64 = 5;

/// Manages the shared Fyers credential: obtain, refresh, expose
pub struct TokenManager {
    repository: Arc<dyn TokenRepository>,
    auth_api: FyersAuthClient,
    grace_period: Duration,
    /// One in-flight refresh at a time, deployment-wide
    refresh_lock: tokio::sync::Mutex<()>,
}

impl TokenManager {
    pub fn new(repository: Arc<dyn TokenRepository>, auth_api: FyersAuthClient) -> Self {
        Self::with_grace_period(
            repository,
            auth_api,
            Duration::minutes(TOKEN_GRACE_PERIOD_MINUTES),
        )
    }

    pub fn with_grace_period(
        repository: Arc<dyn TokenRepository>,
        auth_api: FyersAuthClient,
        grace_period: Duration,
    ) -> Self {
        Self {
            repository,
            auth_api,
            grace_period,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Get a valid access token, refreshing if necessary
    ///
    /// `None` means "authentication required": there is no valid token and
    /// the refresh path is exhausted. Callers must not treat this as a
    /// transient failure.
    pub async fn get_access_token(&self) -> Option<String> {
        match self.current_valid().await {
            Ok(Some(token)) => return Some(token.access_token),
            Ok(None) => {}
            Err(e) => {
                error!("Token store lookup failed: {}", e);
                return None;
            }
        }

        // Single-flight: the first caller refreshes, everyone queued here
        // re-checks and picks up that caller's outcome
        let _guard = self.refresh_lock.lock().await;

        match self.current_valid().await {
            Ok(Some(token)) => return Some(token.access_token),
            Ok(None) => {}
            Err(e) => {
                error!("Token store lookup failed: {}", e);
                return None;
            }
        }

        let latest = match self.store(|repo| repo.latest()).await {
            Ok(latest) => latest,
            Err(e) => {
                error!("Token store lookup failed: {}", e);
                return None;
            }
        };

        let Some(refresh_token) = latest.and_then(|t| t.refresh_token) else {
            error!("No refresh token on record; re-authorization required");
            return None;
        };

        match self.refresh_token(&refresh_token).await {
            Ok(token) => Some(token.access_token),
            Err(e) if e.requires_reauthorization() => {
                error!("Token refresh rejected ({}); re-run the authorization flow", e);
                None
            }
            Err(e) => {
                warn!("Token refresh failed ({}); will retry on next request", e);
                None
            }
        }
    }

    /// URL an administrator visits to start the authorization-code flow
    pub fn authorization_url(&self) -> String {
        self.auth_api.authorization_url()
    }

    /// Exchange a one-time authorization code for the initial token pair
    pub async fn initialize_token(&self, auth_code: &str) -> Result<AccessToken, AuthError> {
        let grant = self.auth_api.exchange_auth_code(auth_code).await?;
        let record = self.persist(grant).await?;
        info!("Successfully initialized token, expires at {}", record.expires_at);
        Ok(record)
    }

    /// Exchange a refresh token for a new token pair
    ///
    /// A rejection is terminal: the refresh token is expired or revoked and
    /// a human has to re-run the authorization-code flow. Nothing is
    /// persisted on failure.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<AccessToken, AuthError> {
        let grant = self.auth_api.refresh(refresh_token).await?;
        let record = self.persist(grant).await?;
        info!("Successfully refreshed token, expires at {}", record.expires_at);
        Ok(record)
    }

    async fn persist(&self, grant: TokenGrant) -> Result<AccessToken, AuthError> {
        self.store(move |repo| {
            repo.insert(NewAccessToken::new(
                grant.access_token,
                grant.refresh_token,
                grant.expires_at,
            ))
        })
        .await
        .map_err(AuthError::from)
    }

    async fn current_valid(&self) -> Result<Option<AccessToken>, DatabaseError> {
        let cutoff = Utc::now() + self.grace_period;
        self.store(move |repo| repo.latest_valid(cutoff)).await
    }

    /// Run a store query on the blocking worker pool so Diesel calls never
    /// stall the session tasks
    async fn store<T, F>(&self, query: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&dyn TokenRepository) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let repository = Arc::clone(&self.repository);
        tokio::task::spawn_blocking(move || query(repository.as_ref()))
            .await
            .map_err(|e| DatabaseError::ConnectionPoolError(format!("Store task failed: {}", e)))?
    }
}
