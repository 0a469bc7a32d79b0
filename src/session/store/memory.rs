//! In-process refresh token repo.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{RefreshTokenRecord, RefreshTokenRepo, RotateOutcome, StoreError};

/// Records keyed by token hash behind a single lock; holding the lock for
/// the whole of `rotate` makes it atomic.
#[derive(Debug, Default)]
pub struct MemoryRefreshTokenRepo {
    records: Mutex<HashMap<String, RefreshTokenRecord>>,
}

impl MemoryRefreshTokenRepo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records for a user, oldest first. Lets tests inspect
    /// the rotation chain, which the repo trait does not expose.
    #[cfg(test)]
    pub(crate) async fn records_for_user(&self, user_id: &str) -> Vec<RefreshTokenRecord> {
        let records = self.records.lock().await;
        let mut matching: Vec<RefreshTokenRecord> = records
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by_key(|record| (record.created_at, record.id));
        matching
    }
}

#[async_trait]
impl RefreshTokenRepo for MemoryRefreshTokenRepo {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.token_hash) {
            return Err(StoreError::Conflict);
        }
        records.insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.get(token_hash).cloned())
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        successor: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<RotateOutcome, StoreError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&successor.token_hash) {
            return Err(StoreError::Conflict);
        }
        let Some(old) = records
            .values_mut()
            .find(|record| record.id == old_id && record.is_usable(now))
        else {
            return Ok(RotateOutcome::Stale);
        };
        old.revoked_at = Some(now);
        old.replaced_by_token_hash = Some(successor.token_hash.clone());
        records.insert(successor.token_hash.clone(), successor.clone());
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.lock().await;
        match records.get_mut(token_hash) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
