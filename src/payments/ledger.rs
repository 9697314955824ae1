//! Ledger storage and the idempotent recorder.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::observability::metrics;
use crate::payments::types::{DonationError, LedgerEntry, LedgerStatus, NewLedgerRecord, RefundRequest};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend answered with an error status.
    #[error("Store returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("No ledger entry for reference '{0}'")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Optional filters for listing entries. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFilter {
    #[serde(default)]
    pub status: Option<LedgerStatus>,
    #[serde(default)]
    pub payer: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl LedgerFilter {
    fn matches(&self, entry: &LedgerEntry) -> bool {
        self.status.map_or(true, |s| s == entry.status)
            && self.payer.as_deref().map_or(true, |p| p == entry.payer)
    }
}

/// Backing store. Uniqueness of `external_reference` is enforced here.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Insert, or update the row with the same reference. A `refunded` row
    /// only accepts `refunded`; any other record returns it unchanged.
    async fn upsert(&self, record: NewLedgerRecord) -> StoreResult<LedgerEntry>;

    async fn get(&self, reference: &str) -> StoreResult<Option<LedgerEntry>>;

    async fn list(&self, filter: &LedgerFilter) -> StoreResult<Vec<LedgerEntry>>;

    /// Move `reference` from `from` to `to` in one step. `Ok(None)` when the
    /// entry exists but is not in `from`; `NotFound` when it does not exist.
    async fn transition(
        &self,
        reference: &str,
        from: LedgerStatus,
        to: LedgerStatus,
    ) -> StoreResult<Option<LedgerEntry>>;

    async fn insert_refund_request(&self, request: &RefundRequest) -> StoreResult<()>;

    async fn list_refund_requests(&self) -> StoreResult<Vec<RefundRequest>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<LedgerEntry>,
    #[serde(default)]
    refund_requests: Vec<RefundRequest>,
}

/// In-process store keyed by reference, with an optional JSON snapshot file.
///
/// Writes are serialized. A write whose snapshot cannot be saved is rolled
/// back, so memory and file never disagree about an acknowledged write.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    entries: Arc<DashMap<String, LedgerEntry>>,
    refund_requests: Arc<DashMap<Uuid, RefundRequest>>,
    persistence_path: Option<String>,
    write_lock: Arc<Mutex<()>>,
}

impl MemoryLedgerStore {
    pub fn new(persistence_path: Option<String>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            refund_requests: Arc::new(DashMap::new()),
            persistence_path,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load from `path` if it exists; later writes are saved back to it.
    pub fn load_from_file(path: &str) -> StoreResult<Self> {
        let store = Self::new(Some(path.to_string()));
        if Path::new(path).exists() {
            let reader = BufReader::new(File::open(path)?);
            let snapshot: Snapshot = serde_json::from_reader(reader)?;
            for entry in snapshot.entries {
                store.entries.insert(entry.external_reference.clone(), entry);
            }
            for request in snapshot.refund_requests {
                store.refund_requests.insert(request.id, request);
            }
            tracing::info!(
                entries = store.entries.len(),
                refund_requests = store.refund_requests.len(),
                path,
                "Loaded ledger snapshot"
            );
        }
        Ok(store)
    }

    /// Write the snapshot file, if one is configured. Callers hold `write_lock`.
    fn save_to_file(&self) -> StoreResult<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let snapshot = Snapshot {
            entries: self.entries.iter().map(|r| r.value().clone()).collect(),
            refund_requests: self.refund_requests.iter().map(|r| r.value().clone()).collect(),
        };

        let tmp = format!("{}.{}.tmp", path, Uuid::new_v4().simple());
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, &snapshot)?;
        writer.flush()?;
        std::fs::rename(&tmp, path)?;
        tracing::debug!(entries = snapshot.entries.len(), path = %path, "Saved ledger snapshot");
        Ok(())
    }

    /// Save after changing `reference`; on failure put `previous` back.
    fn commit_entry(&self, reference: &str, previous: Option<LedgerEntry>) -> StoreResult<()> {
        if let Err(e) = self.save_to_file() {
            match previous {
                Some(entry) => {
                    self.entries.insert(reference.to_string(), entry);
                }
                None => {
                    self.entries.remove(reference);
                }
            }
            tracing::error!(reference, error = %e, "Ledger snapshot failed; write rolled back");
            return Err(e);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for MemoryLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedgerStore")
            .field("entries", &self.entries.len())
            .field("persistence_path", &self.persistence_path)
            .finish()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, record: NewLedgerRecord) -> StoreResult<LedgerEntry> {
        let _write = self.write_lock.lock().await;
        let now = Utc::now();
        let reference = record.external_reference.clone();
        let previous = self.entries.get(&reference).map(|r| r.value().clone());

        let entry = match &previous {
            Some(existing) if existing.status == LedgerStatus::Refunded && record.status != LedgerStatus::Refunded => {
                return Ok(existing.clone());
            }
            Some(existing) => LedgerEntry {
                id: existing.id,
                payer: record.payer,
                amount: record.amount,
                currency: record.currency,
                external_reference: record.external_reference,
                status: record.status,
                method: record.method,
                network: record.network,
                created_at: existing.created_at,
                updated_at: now,
            },
            None => LedgerEntry {
                id: Uuid::new_v4(),
                payer: record.payer,
                amount: record.amount,
                currency: record.currency,
                external_reference: record.external_reference,
                status: record.status,
                method: record.method,
                network: record.network,
                created_at: now,
                updated_at: now,
            },
        };

        self.entries.insert(reference.clone(), entry.clone());
        self.commit_entry(&reference, previous)?;
        Ok(entry)
    }

    async fn get(&self, reference: &str) -> StoreResult<Option<LedgerEntry>> {
        Ok(self.entries.get(reference).map(|r| r.value().clone()))
    }

    async fn list(&self, filter: &LedgerFilter) -> StoreResult<Vec<LedgerEntry>> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    async fn transition(
        &self,
        reference: &str,
        from: LedgerStatus,
        to: LedgerStatus,
    ) -> StoreResult<Option<LedgerEntry>> {
        let _write = self.write_lock.lock().await;
        let (previous, entry) = {
            let mut existing = self
                .entries
                .get_mut(reference)
                .ok_or_else(|| StoreError::NotFound(reference.to_string()))?;
            if existing.status != from {
                return Ok(None);
            }
            let previous = existing.clone();
            existing.status = to;
            existing.updated_at = Utc::now();
            (previous, existing.clone())
        };
        self.commit_entry(reference, Some(previous))?;
        Ok(Some(entry))
    }

    async fn insert_refund_request(&self, request: &RefundRequest) -> StoreResult<()> {
        let _write = self.write_lock.lock().await;
        self.refund_requests.insert(request.id, request.clone());
        if let Err(e) = self.save_to_file() {
            self.refund_requests.remove(&request.id);
            return Err(e);
        }
        Ok(())
    }

    async fn list_refund_requests(&self) -> StoreResult<Vec<RefundRequest>> {
        let mut requests: Vec<_> = self.refund_requests.iter().map(|r| r.value().clone()).collect();
        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(requests)
    }
}

/// Writes ledger entries, idempotently by external reference.
#[derive(Clone)]
pub struct LedgerRecorder {
    store: Arc<dyn LedgerStore>,
}

impl LedgerRecorder {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Record `record`; a second call with the same reference updates the
    /// same entry. A refunded entry is never moved back to another status.
    pub async fn record(&self, record: NewLedgerRecord) -> Result<LedgerEntry, DonationError> {
        let reference = record.external_reference.clone();
        let status = record.status;
        let persistence_failed = |e: StoreError| {
            metrics::record_ledger_write(status.as_str(), false);
            tracing::error!(
                reference = %reference,
                status = %status,
                backend = self.store.backend(),
                error = %e,
                "Ledger write failed"
            );
            DonationError::PersistenceFailed {
                reference: reference.clone(),
                reason: e.to_string(),
            }
        };

        let entry = self.store.upsert(record).await.map_err(&persistence_failed)?;
        if entry.status == LedgerStatus::Refunded && status != LedgerStatus::Refunded {
            tracing::warn!(reference = %reference, requested = %status, "Ignoring status change on refunded entry");
            return Ok(entry);
        }

        metrics::record_ledger_write(status.as_str(), true);
        tracing::info!(reference = %reference, status = %status, id = %entry.id, "Ledger entry recorded");
        Ok(entry)
    }

    pub async fn get(&self, reference: &str) -> Result<Option<LedgerEntry>, StoreError> {
        self.store.get(reference).await
    }

    pub async fn list(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        self.store.list(filter).await
    }
}

impl std::fmt::Debug for LedgerRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerRecorder")
            .field("backend", &self.store.backend())
            .finish()
    }
}
