//! Identity cache
//!
//! Maps a [`SyncKey`] to the registry identity created for it. The cache does
//! not guard against two creations for the same key; the engine holds the
//! key's lock across lookup and creation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sensorsync_core::{
    GatewayError, GatewayResult, IdentityRecord, LocalStore, RemoteIdentity, SyncKey,
};
use tracing::debug;

pub struct IdentityCache {
    store: Arc<dyn LocalStore>,
}

impl IdentityCache {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Identity registered for `key`, `None` if it was never registered
    pub async fn lookup(&self, key: &SyncKey) -> GatewayResult<Option<IdentityRecord>> {
        Ok(self.store.find_identity(key).await?)
    }

    /// Persist the identity the registry returned for a new device
    pub async fn record_created(
        &self,
        key: &SyncKey,
        identity: &RemoteIdentity,
        value: &str,
        at: DateTime<Utc>,
    ) -> GatewayResult<IdentityRecord> {
        let record = IdentityRecord {
            sync_key: key.clone(),
            remote_id: identity.id.clone(),
            remote_token: identity.token.clone(),
            last_value: Some(value.to_string()),
            last_updated_at: at,
        };
        self.store.insert_identity(record.clone()).await?;
        debug!(sync_key = %key, remote_id = %identity.id, "Identity recorded");
        Ok(record)
    }

    /// Record the latest value accepted for an existing identity
    pub async fn touch(&self, key: &SyncKey, value: &str, at: DateTime<Utc>) -> GatewayResult<()> {
        let mut record = self
            .store
            .find_identity(key)
            .await?
            .ok_or_else(|| GatewayError::UnknownIdentity(key.to_string()))?;
        record.last_value = Some(value.to_string());
        record.last_updated_at = at;

        if !self.store.update_identity(record).await? {
            return Err(GatewayError::UnknownIdentity(key.to_string()));
        }
        Ok(())
    }
}
