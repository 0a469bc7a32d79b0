//! Refresh token persistence.
//!
//! Records are keyed by the fingerprint of the raw token and are never
//! deleted here: rotation marks the old record revoked and links it to the
//! fingerprint of its successor, which leaves an audit chain behind.
//!
//! [`RefreshTokenRepo`] is the storage seam (Postgres or in-memory);
//! [`RefreshTokenStore`] wraps a repo with token generation, fingerprinting,
//! and a per-call deadline.

mod memory;
mod postgres;

pub use memory::MemoryRefreshTokenRepo;
pub use postgres::PgRefreshTokenRepo;
pub(crate) use postgres::is_unique_violation;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::{future::Future, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::error::AuthError;
use super::secret::{fingerprint_token, generate_opaque_token, REFRESH_TOKEN_BYTES};

// Attempts before giving up on a fingerprint collision.
const CREATE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token hash already exists")]
    Conflict,
    #[error("store call timed out")]
    Timeout,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persisted refresh token state. The raw token is never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: String,
    #[serde(skip)]
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub replaced_by_token_hash: Option<String>,
}

impl RefreshTokenRecord {
    /// `None` when `now + ttl` is not a representable instant.
    fn new(user_id: &str, token_hash: String, now: DateTime<Utc>, ttl: Duration) -> Option<Self> {
        Some(Self {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            token_hash,
            created_at: now,
            expires_at: now.checked_add_signed(ttl)?,
            revoked_at: None,
            replaced_by_token_hash: None,
        })
    }

    /// A record is usable while it is not revoked and `now < expires_at`.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}

/// Result of a conditional rotation at the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    Rotated,
    /// The old record was already revoked or expired; nothing was written.
    Stale,
}

/// Storage primitives for refresh token records.
///
/// `rotate` must be atomic: either the old record is revoked and linked
/// and the successor is inserted, or nothing changes. Concurrent calls for
/// the same `old_id` must see exactly one `Rotated`.
#[async_trait]
pub trait RefreshTokenRepo: Send + Sync {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;

    async fn find_by_hash(&self, token_hash: &str)
        -> Result<Option<RefreshTokenRecord>, StoreError>;

    async fn rotate(
        &self,
        old_id: Uuid,
        successor: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<RotateOutcome, StoreError>;

    /// Mark a live record revoked. Returns whether a record changed.
    async fn revoke_by_hash(&self, token_hash: &str, now: DateTime<Utc>)
        -> Result<bool, StoreError>;
}

/// Refresh token operations over a [`RefreshTokenRepo`].
#[derive(Clone)]
pub struct RefreshTokenStore {
    repo: Arc<dyn RefreshTokenRepo>,
    timeout: std::time::Duration,
}

impl RefreshTokenStore {
    #[must_use]
    pub fn new(repo: Arc<dyn RefreshTokenRepo>, timeout: std::time::Duration) -> Self {
        Self { repo, timeout }
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                error!(operation, timeout = ?self.timeout, "refresh token store call timed out");
                Err(StoreError::Timeout)
            }
        }
    }

    /// Generate a refresh token for `user_id` and persist its record.
    ///
    /// Returns the raw token (for the client) and the stored record.
    ///
    /// # Errors
    /// `TokenGenerationFailed` on entropy failure or repeated fingerprint
    /// collisions, `StoreUnavailable` on storage failure or timeout.
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        user_id: &str,
        ttl: Duration,
    ) -> Result<(String, RefreshTokenRecord), AuthError> {
        self.create_at(user_id, ttl, Utc::now()).await
    }

    pub(crate) async fn create_at(
        &self,
        user_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(String, RefreshTokenRecord), AuthError> {
        for _ in 0..CREATE_ATTEMPTS {
            let token = new_token()?;
            let record = new_record(user_id, &token, now, ttl)?;
            match self.bounded("insert", self.repo.insert(&record)).await {
                Ok(()) => return Ok((token, record)),
                Err(StoreError::Conflict) => {
                    warn!("refresh token fingerprint collision, retrying");
                }
                Err(err) => {
                    error!("Failed to store refresh token: {err}");
                    return Err(AuthError::StoreUnavailable);
                }
            }
        }
        Err(AuthError::TokenGenerationFailed)
    }

    /// Look up the record for a raw token. `Ok(None)` when unknown.
    ///
    /// # Errors
    /// `StoreUnavailable` on storage failure or timeout.
    #[instrument(skip_all)]
    pub async fn find_by_token(
        &self,
        raw_token: &str,
    ) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let token_hash = fingerprint_token(raw_token);
        self.bounded("find_by_hash", self.repo.find_by_hash(&token_hash))
            .await
            .map_err(|err| {
                error!("Failed to lookup refresh token: {err}");
                AuthError::StoreUnavailable
            })
    }

    /// Revoke `old` and create its successor in one atomic step.
    ///
    /// # Errors
    /// `InvalidOrExpiredToken` when `old` is no longer live (including
    /// losing a race against a concurrent rotation), `StoreUnavailable` on
    /// storage failure or timeout, `TokenGenerationFailed` on entropy
    /// failure.
    #[instrument(skip_all, fields(record_id = %old.id))]
    pub async fn rotate(
        &self,
        old: &RefreshTokenRecord,
        user_id: &str,
        ttl: Duration,
    ) -> Result<(String, RefreshTokenRecord), AuthError> {
        self.rotate_at(old, user_id, ttl, Utc::now()).await
    }

    pub(crate) async fn rotate_at(
        &self,
        old: &RefreshTokenRecord,
        user_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(String, RefreshTokenRecord), AuthError> {
        let token = new_token()?;
        let successor = new_record(user_id, &token, now, ttl)?;
        match self
            .bounded("rotate", self.repo.rotate(old.id, &successor, now))
            .await
        {
            Ok(RotateOutcome::Rotated) => Ok((token, successor)),
            Ok(RotateOutcome::Stale) => {
                debug!("refresh token already rotated or revoked");
                Err(AuthError::InvalidOrExpiredToken)
            }
            Err(StoreError::Conflict) => {
                warn!("refresh token fingerprint collision during rotation");
                Err(AuthError::TokenGenerationFailed)
            }
            Err(err) => {
                error!("Failed to rotate refresh token: {err}");
                Err(AuthError::StoreUnavailable)
            }
        }
    }

    /// Revoke the record for `raw_token` if it is live.
    ///
    /// Unknown and already revoked tokens are a no-op so callers learn
    /// nothing about which tokens exist.
    ///
    /// # Errors
    /// `StoreUnavailable` on storage failure or timeout.
    #[instrument(skip_all)]
    pub async fn revoke(&self, raw_token: &str) -> Result<(), AuthError> {
        self.revoke_at(raw_token, Utc::now()).await
    }

    pub(crate) async fn revoke_at(&self, raw_token: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        let token_hash = fingerprint_token(raw_token);
        match self
            .bounded("revoke", self.repo.revoke_by_hash(&token_hash, now))
            .await
        {
            Ok(changed) => {
                debug!(changed, "refresh token revoke");
                Ok(())
            }
            Err(err) => {
                error!("Failed to revoke refresh token: {err}");
                Err(AuthError::StoreUnavailable)
            }
        }
    }
}

/// `IsUsable` over the current time.
#[must_use]
pub fn is_usable(record: &RefreshTokenRecord) -> bool {
    record.is_usable(Utc::now())
}

fn new_record(
    user_id: &str,
    token: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<RefreshTokenRecord, AuthError> {
    RefreshTokenRecord::new(user_id, fingerprint_token(token), now, ttl).ok_or_else(|| {
        error!(ttl = %ttl, "refresh token expiry out of range");
        AuthError::TokenGenerationFailed
    })
}

fn new_token() -> Result<String, AuthError> {
    generate_opaque_token(REFRESH_TOKEN_BYTES).map_err(|err| {
        error!("Failed to generate refresh token: {err}");
        AuthError::TokenGenerationFailed
    })
}
