//! Local store collaborator
//!
//! The gateway keeps three collections: identity records keyed by
//! [`SyncKey`], the append-only log of sensor reports, and the ledger of
//! allocated radio addresses. Implementations must be safe for concurrent
//! point lookups and inserts; single-record atomicity is all that is required.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::{IdentityRecord, SensorReport, SyncKey};

/// Keyed find/insert interface over the gateway's persistent collections
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Point lookup of the identity registered for a key
    async fn find_identity(&self, key: &SyncKey) -> StoreResult<Option<IdentityRecord>>;

    /// Insert a new identity record
    ///
    /// Fails with [`StoreError::Duplicate`](crate::StoreError::Duplicate) if
    /// the key already has a record.
    async fn insert_identity(&self, record: IdentityRecord) -> StoreResult<()>;

    /// Replace an existing identity record
    ///
    /// Returns `false` if no record exists for the key.
    async fn update_identity(&self, record: IdentityRecord) -> StoreResult<bool>;

    /// Append a sensor report
    async fn insert_report(&self, report: SensorReport) -> StoreResult<()>;

    /// All reports stored for a key, oldest first
    async fn find_reports(&self, key: &SyncKey) -> StoreResult<Vec<SensorReport>>;

    /// All radio addresses in the ledger
    async fn radio_addresses(&self) -> StoreResult<Vec<u8>>;

    /// Add an address to the ledger
    async fn insert_radio_address(&self, address: u8) -> StoreResult<()>;
}
