//! In-memory store

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::LocalStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{IdentityRecord, SensorReport, SyncKey};

/// Contents of a store, shared by the in-memory and file-backed variants
#[derive(Debug, Default, Clone)]
pub(crate) struct StoreState {
    identities: HashMap<SyncKey, IdentityRecord>,
    reports: Vec<SensorReport>,
    radio_addresses: BTreeSet<u8>,
}

/// Serialized form of [`StoreState`]
///
/// Reports are not part of the snapshot; persistent stores keep them in an
/// append-only log of their own.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    #[serde(default)]
    identities: Vec<IdentityRecord>,
    #[serde(default)]
    radio_addresses: Vec<u8>,
}

impl StoreState {
    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            identities: snapshot
                .identities
                .into_iter()
                .map(|r| (r.sync_key.clone(), r))
                .collect(),
            reports: Vec::new(),
            radio_addresses: snapshot.radio_addresses.into_iter().collect(),
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let mut identities: Vec<_> = self.identities.values().cloned().collect();
        identities.sort_by(|a, b| a.sync_key.cmp(&b.sync_key));
        Snapshot {
            identities,
            radio_addresses: self.radio_addresses.iter().copied().collect(),
        }
    }

    pub(crate) fn insert_identity(&mut self, record: IdentityRecord) -> StoreResult<()> {
        if self.identities.contains_key(&record.sync_key) {
            return Err(StoreError::Duplicate(record.sync_key.to_string()));
        }
        self.identities.insert(record.sync_key.clone(), record);
        Ok(())
    }

    pub(crate) fn update_identity(&mut self, record: IdentityRecord) -> bool {
        match self.identities.get_mut(&record.sync_key) {
            Some(existing) => {
                *existing = record;
                true
            }
            None => false,
        }
    }

    pub(crate) fn insert_report(&mut self, report: SensorReport) {
        self.reports.push(report);
    }

    pub(crate) fn insert_radio_address(&mut self, address: u8) -> StoreResult<()> {
        if !self.radio_addresses.insert(address) {
            return Err(StoreError::Duplicate(format!("radio address {}", address)));
        }
        Ok(())
    }

    fn find_identity(&self, key: &SyncKey) -> Option<IdentityRecord> {
        self.identities.get(key).cloned()
    }

    fn find_reports(&self, key: &SyncKey) -> Vec<SensorReport> {
        self.reports
            .iter()
            .filter(|r| &r.sync_key == key)
            .cloned()
            .collect()
    }

    fn radio_addresses(&self) -> Vec<u8> {
        self.radio_addresses.iter().copied().collect()
    }
}

/// Thread-safe store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub(crate) state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose ledger already holds the given addresses
    pub fn with_radio_addresses(addresses: impl IntoIterator<Item = u8>) -> Self {
        let store = Self::new();
        store.state.write().radio_addresses.extend(addresses);
        store
    }

    /// Number of identity records
    pub fn identity_count(&self) -> usize {
        self.state.read().identities.len()
    }

    /// Number of stored reports
    pub fn report_count(&self) -> usize {
        self.state.read().reports.len()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn find_identity(&self, key: &SyncKey) -> StoreResult<Option<IdentityRecord>> {
        Ok(self.state.read().find_identity(key))
    }

    async fn insert_identity(&self, record: IdentityRecord) -> StoreResult<()> {
        self.state.write().insert_identity(record)
    }

    async fn update_identity(&self, record: IdentityRecord) -> StoreResult<bool> {
        Ok(self.state.write().update_identity(record))
    }

    async fn insert_report(&self, report: SensorReport) -> StoreResult<()> {
        self.state.write().insert_report(report);
        Ok(())
    }

    async fn find_reports(&self, key: &SyncKey) -> StoreResult<Vec<SensorReport>> {
        Ok(self.state.read().find_reports(key))
    }

    async fn radio_addresses(&self) -> StoreResult<Vec<u8>> {
        Ok(self.state.read().radio_addresses())
    }

    async fn insert_radio_address(&self, address: u8) -> StoreResult<()> {
        self.state.write().insert_radio_address(address)
    }
}
