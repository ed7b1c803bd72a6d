//! Typed record layer over the `records` collection
//!
//! Records live under `rec:{id}`; a secondary index key `dom:{domain}:{id}`
//! backs the by-domain queries. Both keys are maintained in the same write
//! batch as the record itself.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::engine::{Collection, StorageEngine, StoreBatch};
use crate::error::{StoreError, StoreResult};

const REC_PREFIX: &str = "rec:";
const DOMAIN_PREFIX: &str = "dom:";

/// A locally stored record.
///
/// `synced` is false whenever a pending operation still references the
/// record's latest state; the sync engine flips it back to true once the last
/// referencing operation is acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub domain: String,
    pub record_type: String,
    pub payload: JsonValue,
    pub created_at: u64,
    pub updated_at: u64,
    pub synced: bool,
}

/// Accessor for the `records` collection.
#[derive(Clone)]
pub struct RecordStore {
    engine: Arc<StorageEngine>,
}

impl RecordStore {
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    fn record_key(id: &str) -> String {
        format!("{}{}", REC_PREFIX, id)
    }

    fn domain_key(domain: &str, id: &str) -> String {
        format!("{}{}:{}", DOMAIN_PREFIX, domain, id)
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<Record>> {
        match self.engine.get(Collection::Records, &Self::record_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stage a record write (primary key + domain index) into `batch`.
    pub fn stage_put(&self, batch: &mut StoreBatch, record: &Record) -> StoreResult<()> {
        let bytes = serde_json::to_vec(record)?;
        batch.put(Collection::Records, Self::record_key(&record.id), bytes);
        batch.put(
            Collection::Records,
            Self::domain_key(&record.domain, &record.id),
            record.id.as_bytes().to_vec(),
        );
        Ok(())
    }

    /// Stage removal of a record and its domain index entry.
    pub fn stage_delete(&self, batch: &mut StoreBatch, record: &Record) {
        batch.delete(Collection::Records, Self::record_key(&record.id));
        batch.delete(
            Collection::Records,
            Self::domain_key(&record.domain, &record.id),
        );
    }

    /// Stage removal of a stale domain index entry (used when an upsert moves
    /// a record to a different domain).
    pub fn stage_delete_domain_index(&self, batch: &mut StoreBatch, domain: &str, id: &str) {
        batch.delete(Collection::Records, Self::domain_key(domain, id));
    }

    /// All records tagged with `domain`, optionally narrowed by record type.
    pub fn list_by_domain(
        &self,
        domain: &str,
        record_type: Option<&str>,
    ) -> StoreResult<Vec<Record>> {
        let prefix = format!("{}{}:", DOMAIN_PREFIX, domain);
        let index = self.engine.scan_prefix(Collection::Records, &prefix)?;

        let mut records = Vec::with_capacity(index.len());
        for (key, id_bytes) in index {
            let id = String::from_utf8(id_bytes)
                .map_err(|_| StoreError::Storage(format!("Corrupt domain index entry {}", key)))?;
            match self.get(&id)? {
                Some(record) => {
                    if record_type.map_or(true, |t| record.record_type == t) {
                        records.push(record);
                    }
                }
                None => {
                    tracing::warn!("Domain index entry {} points at missing record {}", key, id);
                }
            }
        }
        Ok(records)
    }

    /// All records with `synced == false`.
    pub fn unsynced(&self) -> StoreResult<Vec<Record>> {
        let entries = self.engine.scan_prefix(Collection::Records, REC_PREFIX)?;
        let mut records = Vec::new();
        for (_, bytes) in entries {
            let record: Record = serde_json::from_slice(&bytes)?;
            if !record.synced {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn mark_synced(&self, id: &str) -> StoreResult<()> {
        let mut record = self
            .get(id)?
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))?;
        if record.synced {
            return Ok(());
        }
        record.synced = true;
        let bytes = serde_json::to_vec(&record)?;
        self.engine
            .put(Collection::Records, &Self::record_key(id), &bytes)
    }

    /// Number of stored records (index keys excluded).
    pub fn count(&self) -> StoreResult<usize> {
        Ok(self
            .engine
            .scan_prefix(Collection::Records, REC_PREFIX)?
            .len())
    }
}
