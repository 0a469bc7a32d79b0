//! Issue, rotate, and revoke access/refresh token pairs.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use super::access;
use super::config::SessionConfig;
use super::error::AuthError;
use super::store::RefreshTokenStore;

/// Plaintext tokens handed to the client. Neither value is persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[derive(Clone)]
pub struct SessionIssuer {
    config: Arc<SessionConfig>,
    store: RefreshTokenStore,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(config: Arc<SessionConfig>, store: RefreshTokenStore) -> Self {
        Self { config, store }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Issue a new token pair for a verified user.
    ///
    /// # Errors
    /// `TokenGenerationFailed` when signing or entropy fails, `StoreUnavailable`
    /// when the refresh record cannot be stored. On any error the caller gets
    /// neither token.
    #[instrument(skip(self))]
    pub async fn issue(&self, user_id: &str) -> Result<TokenPair, AuthError> {
        self.issue_at(user_id, Utc::now()).await
    }

    pub(crate) async fn issue_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let access_token = self.sign_access(user_id, now)?;

        // If this fails `access_token` is dropped with the error.
        let (refresh_token, record) = self
            .store
            .create_at(user_id, self.config.refresh_ttl(), now)
            .await?;

        info!(record_id = %record.id, "issued session");
        Ok(TokenPair {
            access_token,
            refresh_token,
            user_id: user_id.to_string(),
        })
    }

    /// Exchange a presented refresh token for a new pair.
    ///
    /// Unknown, revoked and expired tokens all fail with the same
    /// `InvalidOrExpiredToken`.
    ///
    /// # Errors
    /// `InvalidOrExpiredToken` for unusable tokens, `StoreUnavailable` or
    /// `TokenGenerationFailed` for internal failures.
    #[instrument(skip_all)]
    pub async fn rotate(&self, presented: &str) -> Result<TokenPair, AuthError> {
        self.rotate_at(presented, Utc::now()).await
    }

    pub(crate) async fn rotate_at(
        &self,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let Some(record) = self.store.find_by_token(presented).await? else {
            debug!("refresh token not found");
            return Err(AuthError::InvalidOrExpiredToken);
        };
        if !record.is_usable(now) {
            debug!(record_id = %record.id, "refresh token revoked or expired");
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let (refresh_token, successor) = self
            .store
            .rotate_at(&record, &record.user_id, self.config.refresh_ttl(), now)
            .await?;

        let access_token = self.sign_access(&record.user_id, now)?;

        info!(
            record_id = %record.id,
            successor_id = %successor.id,
            "rotated session"
        );
        Ok(TokenPair {
            access_token,
            refresh_token,
            user_id: record.user_id,
        })
    }

    /// Revoke the presented refresh token. Always succeeds from the
    /// caller's point of view; store failures are only logged.
    #[instrument(skip_all)]
    pub async fn revoke_session(&self, presented: &str) {
        if let Err(err) = self.store.revoke(presented).await {
            error!("Failed to revoke session: {err}");
        }
    }

    fn sign_access(&self, user_id: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        access::encode_at(user_id, now, self.config.access_ttl(), self.config.signing_secret())
            .map_err(|err| {
                error!("Failed to sign access token: {err}");
                AuthError::TokenGenerationFailed
            })
    }
}
