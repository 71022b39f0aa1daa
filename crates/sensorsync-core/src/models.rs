//! Records kept by the gateway

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Identifies one logical variable stream: a sensor type reported by a
/// child of a node, owned by a user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncKey {
    pub user_id: String,
    pub node_address: u8,
    pub child_address: u8,
    pub sensor_type: u8,
}

impl SyncKey {
    pub fn new(
        user_id: impl Into<String>,
        node_address: u8,
        child_address: u8,
        sensor_type: u8,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            node_address,
            child_address,
            sensor_type,
        }
    }

    /// Key for the variable stream a message reports on
    pub fn for_message(user_id: &str, message: &Message) -> Self {
        Self::new(
            user_id,
            message.node_address,
            message.child_address,
            message.sub_type,
        )
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.user_id, self.node_address, self.child_address, self.sensor_type
        )
    }
}

/// Remote registry identity: opaque device id plus its access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub id: String,
    pub token: String,
}

/// Mapping from a [`SyncKey`] to the registry device created for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub sync_key: SyncKey,
    pub remote_id: String,
    pub remote_token: String,
    /// Last value accepted by the registry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_value: Option<String>,
    pub last_updated_at: DateTime<Utc>,
}

impl IdentityRecord {
    pub fn identity(&self) -> RemoteIdentity {
        RemoteIdentity {
            id: self.remote_id.clone(),
            token: self.remote_token.clone(),
        }
    }
}

/// One SetVariable report as persisted locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReport {
    pub sync_key: SyncKey,
    pub value: String,
    pub timestamp: DateTime<Utc>,
    /// Whether the remote registry accepted this report
    pub synced: bool,
}

impl SensorReport {
    pub fn new(sync_key: SyncKey, value: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            sync_key,
            value: value.into(),
            timestamp,
            synced: false,
        }
    }

    pub fn synced(mut self, synced: bool) -> Self {
        self.synced = synced;
        self
    }
}
