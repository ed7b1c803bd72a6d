//! Durable pending-operation queue
//!
//! Every local mutation enqueues a [`PendingOperation`] here, in the same
//! write batch as the record it mutates. Operations stay queued until the
//! remote endpoint acknowledges them; failures increment a retry counter
//! capped at the configured maximum.
//!
//! Ordering: operations are drained by priority ascending (lower = more
//! urgent), FIFO within a priority band. The ordering comes from the index
//! key layout (`ord:{priority}:{sequence}`), so a prefix scan returns
//! operations already sorted.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{StoreError, StoreResult};
use crate::storage::{Collection, StorageEngine, StoreBatch};

const OP_PREFIX: &str = "op:";
const ORD_PREFIX: &str = "ord:";
const SEQ_KEY: &str = "_sequence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// A not-yet-acknowledged mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: String,
    pub kind: OperationKind,
    pub domain: String,
    /// Id of the record this operation mutates
    pub record_id: String,
    pub payload: JsonValue,
    /// Lower = more urgent
    pub priority: i32,
    pub retry_count: u32,
    pub sequence: u64,
    pub created_at: u64, // Unix timestamp (milliseconds)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Ordered durable queue over the `pending_ops` collection.
pub struct PendingQueue {
    engine: Arc<StorageEngine>,
    sequence: Mutex<u64>,
    max_retries: u32,
}

impl PendingQueue {
    /// Open the queue, loading the persisted sequence counter.
    pub fn open(engine: Arc<StorageEngine>, max_retries: u32) -> StoreResult<Self> {
        let sequence = match engine.get(Collection::PendingOps, SEQ_KEY)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().unwrap_or([0u8; 8]);
                u64::from_be_bytes(arr)
            }
            None => 0,
        };

        Ok(Self {
            engine,
            sequence: Mutex::new(sequence),
            max_retries,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn op_key(id: &str) -> String {
        format!("{}{}", OP_PREFIX, id)
    }

    // Priorities are offset into unsigned space so the zero-padded key order
    // matches numeric order, negatives included.
    fn ord_key(priority: i32, sequence: u64) -> String {
        let ordinal = (priority as i64 - i32::MIN as i64) as u64;
        format!("{}{:010}:{:020}", ORD_PREFIX, ordinal, sequence)
    }

    /// Stage an enqueue into a caller-owned batch. Used by the mutation API
    /// so the record write and its operation land atomically.
    pub fn stage_enqueue(
        &self,
        batch: &mut StoreBatch,
        kind: OperationKind,
        domain: &str,
        record_id: &str,
        payload: JsonValue,
        priority: i32,
    ) -> StoreResult<PendingOperation> {
        let sequence = {
            let mut seq = self.sequence.lock().unwrap();
            *seq += 1;
            *seq
        };

        let op = PendingOperation {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            domain: domain.to_string(),
            record_id: record_id.to_string(),
            payload,
            priority,
            retry_count: 0,
            sequence,
            created_at: now_millis(),
        };

        let bytes = serde_json::to_vec(&op)?;
        batch.put(Collection::PendingOps, Self::op_key(&op.id), bytes);
        batch.put(
            Collection::PendingOps,
            Self::ord_key(op.priority, op.sequence),
            op.id.as_bytes().to_vec(),
        );
        batch.put(
            Collection::PendingOps,
            SEQ_KEY.to_string(),
            sequence.to_be_bytes().to_vec(),
        );

        Ok(op)
    }

    /// Enqueue a standalone operation.
    pub fn enqueue(
        &self,
        kind: OperationKind,
        domain: &str,
        record_id: &str,
        payload: JsonValue,
        priority: i32,
    ) -> StoreResult<PendingOperation> {
        let mut batch = self.engine.batch();
        let op = self.stage_enqueue(&mut batch, kind, domain, record_id, payload, priority)?;
        self.engine.write(batch)?;
        tracing::debug!(
            "Enqueued {} operation {} for record {} (priority {})",
            op.kind,
            op.id,
            op.record_id,
            op.priority
        );
        Ok(op)
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<PendingOperation>> {
        match self.engine.get(Collection::PendingOps, &Self::op_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All pending operations, priority ascending then FIFO.
    pub fn list_ordered(&self) -> StoreResult<Vec<PendingOperation>> {
        let index = self.engine.scan_prefix(Collection::PendingOps, ORD_PREFIX)?;

        let mut ops = Vec::with_capacity(index.len());
        for (key, id_bytes) in index {
            let id = String::from_utf8(id_bytes)
                .map_err(|_| StoreError::Storage(format!("Corrupt queue index entry {}", key)))?;
            match self.get(&id)? {
                Some(op) => ops.push(op),
                None => {
                    tracing::warn!("Queue index entry {} points at missing operation {}", key, id);
                }
            }
        }
        Ok(ops)
    }

    /// Remove an acknowledged operation. Removing an id that is already gone
    /// is a no-op.
    pub fn remove(&self, id: &str) -> StoreResult<()> {
        let Some(op) = self.get(id)? else {
            return Ok(());
        };

        let mut batch = self.engine.batch();
        batch.delete(Collection::PendingOps, Self::op_key(id));
        batch.delete(
            Collection::PendingOps,
            Self::ord_key(op.priority, op.sequence),
        );
        self.engine.write(batch)
    }

    /// Bump the retry counter, saturating at the configured cap, and return
    /// the updated operation.
    pub fn increment_retry(&self, id: &str) -> StoreResult<PendingOperation> {
        let mut op = self
            .get(id)?
            .ok_or_else(|| StoreError::OperationNotFound(id.to_string()))?;

        if op.retry_count < self.max_retries {
            op.retry_count += 1;
            let bytes = serde_json::to_vec(&op)?;
            self.engine
                .put(Collection::PendingOps, &Self::op_key(id), &bytes)?;
        }

        Ok(op)
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self
            .engine
            .scan_prefix(Collection::PendingOps, OP_PREFIX)?
            .len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Ids of all records that still have at least one queued operation.
    pub fn record_ids_with_pending(&self) -> StoreResult<HashSet<String>> {
        let entries = self.engine.scan_prefix(Collection::PendingOps, OP_PREFIX)?;
        let mut ids = HashSet::new();
        for (_, bytes) in entries {
            let op: PendingOperation = serde_json::from_slice(&bytes)?;
            ids.insert(op.record_id);
        }
        Ok(ids)
    }
}
