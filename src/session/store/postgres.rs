//! Postgres-backed refresh token repo.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

use super::{RefreshTokenRecord, RefreshTokenRepo, RotateOutcome, StoreError};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone, Debug)]
pub struct PgRefreshTokenRepo {
    pool: PgPool,
}

impl PgRefreshTokenRepo {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| code.as_ref() == UNIQUE_VIOLATION),
        _ => false,
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Conflict
    } else {
        StoreError::Database(err)
    }
}

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

const INSERT_QUERY: &str = r"
    INSERT INTO refresh_tokens
        (id, user_id, token_hash, created_at, expires_at)
    VALUES ($1, $2, $3, $4, $5)
";

#[async_trait]
impl RefreshTokenRepo for PgRefreshTokenRepo {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(INSERT_QUERY)
            .bind(record.id)
            .bind(&record.user_id)
            .bind(&record.token_hash)
            .bind(record.created_at)
            .bind(record.expires_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", INSERT_QUERY))
            .await
            .map_err(map_insert_error)?;
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let query = r"
            SELECT id, user_id, token_hash, created_at, expires_at,
                   revoked_at, replaced_by_token_hash
            FROM refresh_tokens
            WHERE token_hash = $1
        ";
        let record = sqlx::query_as::<_, RefreshTokenRecord>(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(record)
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        successor: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<RotateOutcome, StoreError> {
        // One transaction: if the future is dropped before COMMIT the
        // transaction rolls back and the old record stays live.
        let mut tx = self.pool.begin().await?;

        // The row lock taken by UPDATE serializes concurrent rotations; the
        // loser re-checks `revoked_at IS NULL` and matches zero rows.
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2,
                replaced_by_token_hash = $3
            WHERE id = $1
              AND revoked_at IS NULL
              AND expires_at > $2
        ";
        let updated = sqlx::query(query)
            .bind(old_id)
            .bind(now)
            .bind(&successor.token_hash)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await?
            .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(RotateOutcome::Stale);
        }

        sqlx::query(INSERT_QUERY)
            .bind(successor.id)
            .bind(&successor.user_id)
            .bind(&successor.token_hash)
            .bind(successor.created_at)
            .bind(successor.expires_at)
            .execute(&mut *tx)
            .instrument(db_span("INSERT", INSERT_QUERY))
            .await
            .map_err(map_insert_error)?;

        tx.commit().await?;
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // Only the first revoke stamps `revoked_at`.
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE token_hash = $1
              AND revoked_at IS NULL
        ";
        let updated = sqlx::query(query)
            .bind(token_hash)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?
            .rows_affected();
        Ok(updated > 0)
    }
}
