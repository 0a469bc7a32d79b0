//! User directory used by signup and login.
//!
//! The session core only ever sees the user id; emails and password hashes
//! stay here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::session::store::is_unique_violation;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome when attempting to create a user.
#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(UserRecord),
    Conflict,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<CreateUserOutcome>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;
}

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: sqlx::PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<CreateUserOutcome> {
        let query = r"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, created_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query_as::<_, UserRecord>(query)
            .bind(Uuid::now_v7())
            .bind(email)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(user) => Ok(CreateUserOutcome::Created(user)),
            Err(err) if is_unique_violation(&err) => Ok(CreateUserOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = r"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, UserRecord>(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user")
    }
}

/// In-process user directory keyed by normalized email.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<CreateUserOutcome> {
        let mut users = self.users.lock().await;
        if users.contains_key(email) {
            return Ok(CreateUserOutcome::Conflict);
        }
        let user = UserRecord {
            id: Uuid::now_v7(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        users.insert(email.to_string(), user.clone());
        Ok(CreateUserOutcome::Created(user))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.lock().await.get(email).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_rejects_duplicate_email() -> Result<()> {
        let store = MemoryUserStore::new();
        let first = store.create_user("a@example.com", "hash").await?;
        assert!(matches!(first, CreateUserOutcome::Created(_)));
        let second = store.create_user("a@example.com", "other").await?;
        assert!(matches!(second, CreateUserOutcome::Conflict));

        let found = store.find_by_email("a@example.com").await?;
        assert_eq!(found.map(|u| u.password_hash), Some("hash".to_string()));
        assert!(store.find_by_email("b@example.com").await?.is_none());
        Ok(())
    }
}
