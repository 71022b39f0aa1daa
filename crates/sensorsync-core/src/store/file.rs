//! JSON file backed store
//!
//! Identities and the radio address ledger live in memory and are written as
//! a JSON snapshot (temp file + rename) before each change is applied, so a
//! failed write leaves both memory and disk at the previous state. Reports
//! are appended to a JSON-lines log next to the snapshot and never rewritten.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::memory::{Snapshot, StoreState};
use super::{LocalStore, MemoryStore};
use crate::error::StoreResult;
use crate::models::{IdentityRecord, SensorReport, SyncKey};

/// Store persisted as a JSON snapshot plus a JSON-lines report log
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    reports_path: PathBuf,
    inner: MemoryStore,
    /// Serializes snapshot writes so they land on disk in order
    write_lock: Mutex<()>,
    report_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing state if the file exists
    ///
    /// Reports go to `path` with the extension replaced by `reports.jsonl`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let reports_path = path.with_extension("reports.jsonl");
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                let state = StoreState::from_snapshot(snapshot);
                info!(path = %path.display(), "Loaded local store");
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Local store not found, starting empty");
                StoreState::default()
            }
            Err(e) => return Err(e.into()),
        };

        let inner = MemoryStore::default();
        *inner.state.write() = state;

        Ok(Self {
            path,
            reports_path,
            inner,
            write_lock: Mutex::new(()),
            report_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the append-only report log
    pub fn reports_path(&self) -> &Path {
        &self.reports_path
    }

    /// Apply `change` to a copy of the state, persist the copy, then swap it in
    ///
    /// `change` returns whether it modified anything; unchanged state is not
    /// written.
    async fn commit<F>(&self, change: F) -> StoreResult<bool>
    where
        F: FnOnce(&mut StoreState) -> StoreResult<bool> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut candidate = self.inner.state.read().clone();
        if !change(&mut candidate)? {
            return Ok(false);
        }
        self.persist(&candidate).await?;
        *self.inner.state.write() = candidate;
        Ok(true)
    }

    async fn persist(&self, state: &StoreState) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(&state.snapshot())?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = json.len(), "Persisted local store");
        Ok(())
    }
}

#[async_trait]
impl LocalStore for JsonFileStore {
    async fn find_identity(&self, key: &SyncKey) -> StoreResult<Option<IdentityRecord>> {
        self.inner.find_identity(key).await
    }

    async fn insert_identity(&self, record: IdentityRecord) -> StoreResult<()> {
        self.commit(|state| state.insert_identity(record).map(|_| true))
            .await
            .map(|_| ())
    }

    async fn update_identity(&self, record: IdentityRecord) -> StoreResult<bool> {
        self.commit(|state| Ok(state.update_identity(record))).await
    }

    async fn insert_report(&self, report: SensorReport) -> StoreResult<()> {
        let mut line = serde_json::to_vec(&report)?;
        line.push(b'\n');

        let _guard = self.report_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.reports_path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn find_reports(&self, key: &SyncKey) -> StoreResult<Vec<SensorReport>> {
        let contents = match tokio::fs::read_to_string(&self.reports_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reports = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SensorReport>(line) {
                Ok(report) if &report.sync_key == key => reports.push(report),
                Ok(_) => {}
                Err(e) => {
                    // A crash mid-append leaves a torn final line
                    warn!(path = %self.reports_path.display(), line = number + 1, error = %e, "Skipping unreadable report");
                }
            }
        }
        Ok(reports)
    }

    async fn radio_addresses(&self) -> StoreResult<Vec<u8>> {
        self.inner.radio_addresses().await
    }

    async fn insert_radio_address(&self, address: u8) -> StoreResult<()> {
        self.commit(|state| state.insert_radio_address(address).map(|_| true))
            .await
            .map(|_| ())
    }
}
