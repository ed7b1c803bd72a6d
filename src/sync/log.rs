//! Append-only reconciliation journal
//!
//! One entry per reconciliation attempt, success or failure. Entries are
//! never mutated and never deleted by normal operation. Keys are zero-padded
//! sequence numbers so iteration order is append order; the current sequence
//! is persisted beside the entries.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::queue::{OperationKind, PendingOperation};
use crate::storage::{Collection, StorageEngine};

const LOG_PREFIX: &str = "log:";
const SEQ_KEY: &str = "_sequence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub sequence: u64,
    pub timestamp: u64, // Unix timestamp (milliseconds)
    pub operation_id: String,
    pub kind: OperationKind,
    pub domain: String,
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Persistent sync log over the `sync_log` collection.
pub struct SyncLog {
    engine: Arc<StorageEngine>,
    sequence: Mutex<u64>,
}

impl SyncLog {
    pub fn open(engine: Arc<StorageEngine>) -> StoreResult<Self> {
        let sequence = match engine.get(Collection::SyncLog, SEQ_KEY)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().unwrap_or([0u8; 8]);
                u64::from_be_bytes(arr)
            }
            None => 0,
        };

        Ok(Self {
            engine,
            sequence: Mutex::new(sequence),
        })
    }

    fn entry_key(sequence: u64) -> String {
        format!("{}{:020}", LOG_PREFIX, sequence)
    }

    /// Append one attempt record for `op`.
    pub fn append(
        &self,
        op: &PendingOperation,
        status: SyncStatus,
        detail: Option<&str>,
    ) -> StoreResult<SyncLogEntry> {
        let sequence = {
            let mut seq = self.sequence.lock().unwrap();
            *seq += 1;
            *seq
        };

        let entry = SyncLogEntry {
            sequence,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            operation_id: op.id.clone(),
            kind: op.kind,
            domain: op.domain.clone(),
            status,
            detail: detail.map(|d| d.to_string()),
        };

        let mut batch = self.engine.batch();
        batch.put(
            Collection::SyncLog,
            Self::entry_key(sequence),
            serde_json::to_vec(&entry)?,
        );
        batch.put(
            Collection::SyncLog,
            SEQ_KEY.to_string(),
            sequence.to_be_bytes().to_vec(),
        );
        self.engine.write(batch)?;

        Ok(entry)
    }

    /// Entries with sequence greater than `after_sequence`, oldest first.
    pub fn entries_after(&self, after_sequence: u64, limit: usize) -> StoreResult<Vec<SyncLogEntry>> {
        let entries = self.engine.scan_prefix(Collection::SyncLog, LOG_PREFIX)?;

        let mut result = Vec::new();
        for (_, bytes) in entries {
            let entry: SyncLogEntry = serde_json::from_slice(&bytes)?;
            if entry.sequence > after_sequence {
                result.push(entry);
                if result.len() >= limit {
                    break;
                }
            }
        }
        Ok(result)
    }

    pub fn current_sequence(&self) -> u64 {
        *self.sequence.lock().unwrap()
    }
}
