//! The offline store facade
//!
//! Composes the storage engine, record layer, pending queue, cache, sync log,
//! connectivity monitor and reconciliation engine behind the API the
//! application uses. Every mutation writes the record and enqueues its
//! pending operation in one atomic batch.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::cache::{CacheStore, CacheSweeper};
use crate::config::StoreConfig;
use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::error::{StoreError, StoreResult};
use crate::events::Subscription;
use crate::queue::{OperationKind, PendingOperation, PendingQueue};
use crate::storage::{Record, RecordStore, StorageEngine};
use crate::sync::engine::{SyncEngine, SyncReport};
use crate::sync::log::{SyncLog, SyncLogEntry};
use crate::sync::remote::RemoteEndpoint;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// Domain and id land in composite index keys, so the separator is reserved.
fn validate_tag(what: &str, value: &str) -> StoreResult<()> {
    if value.is_empty() || value.contains(':') {
        return Err(StoreError::InvalidArgument(format!(
            "{} must be non-empty and must not contain ':'",
            what
        )));
    }
    Ok(())
}

/// Shallow JSON-object merge: keys in `patch` overwrite keys in `base`.
/// Anything that is not a pair of objects replaces the base wholesale.
fn merge_payload(base: &mut JsonValue, patch: JsonValue) {
    match (base, patch) {
        (JsonValue::Object(base_map), JsonValue::Object(patch_map)) => {
            for (key, value) in patch_map {
                base_map.insert(key, value);
            }
        }
        (base, patch) => *base = patch,
    }
}

/// Offline-first local store with background-free, explicitly triggered
/// synchronization.
pub struct OfflineStore {
    engine: Arc<StorageEngine>,
    records: RecordStore,
    queue: Arc<PendingQueue>,
    log: Arc<SyncLog>,
    cache: CacheStore,
    monitor: Arc<ConnectivityMonitor>,
    sync: SyncEngine,
    config: StoreConfig,
}

impl OfflineStore {
    /// Open the store at `config.data_dir`, reconciling against `remote`.
    pub fn open(config: StoreConfig, remote: Arc<dyn RemoteEndpoint>) -> StoreResult<Self> {
        let engine = Arc::new(StorageEngine::open(&config.data_dir)?);
        let records = RecordStore::new(engine.clone());
        let queue = Arc::new(PendingQueue::open(engine.clone(), config.max_retries)?);
        let log = Arc::new(SyncLog::open(engine.clone())?);
        let cache = CacheStore::new(engine.clone());
        let monitor = Arc::new(ConnectivityMonitor::new());

        let sync = SyncEngine::new(
            records.clone(),
            queue.clone(),
            log.clone(),
            remote,
            monitor.clone(),
            config.max_retries,
        );

        info!(
            "Opened offline store at {} ({} operations pending)",
            config.data_dir.display(),
            queue.len()?
        );

        Ok(Self {
            engine,
            records,
            queue,
            log,
            cache,
            monitor,
            sync,
            config,
        })
    }

    /// Flush and close the underlying storage. Subsequent calls on any
    /// component fail with [`StoreError::Closed`].
    pub fn close(&self) -> StoreResult<()> {
        self.engine.close()
    }

    // ==================== Mutation API ====================

    /// Create (or replace) a record and enqueue its create operation.
    /// Returns the record id, generated when the caller supplies none.
    pub fn write(
        &self,
        domain: &str,
        record_type: &str,
        payload: JsonValue,
        id: Option<String>,
    ) -> StoreResult<String> {
        validate_tag("domain", domain)?;
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        validate_tag("id", &id)?;

        let now = now_millis();
        let mut batch = self.engine.batch();

        let record = match self.records.get(&id)? {
            Some(existing) => {
                // Upsert: payload replaced, creation time kept. A domain move
                // leaves a stale index entry behind unless removed here.
                if existing.domain != domain {
                    self.records
                        .stage_delete_domain_index(&mut batch, &existing.domain, &id);
                }
                Record {
                    id: id.clone(),
                    domain: domain.to_string(),
                    record_type: record_type.to_string(),
                    payload: payload.clone(),
                    created_at: existing.created_at,
                    updated_at: now,
                    synced: false,
                }
            }
            None => Record {
                id: id.clone(),
                domain: domain.to_string(),
                record_type: record_type.to_string(),
                payload: payload.clone(),
                created_at: now,
                updated_at: now,
                synced: false,
            },
        };

        self.records.stage_put(&mut batch, &record)?;
        let op = self.queue.stage_enqueue(
            &mut batch,
            OperationKind::Create,
            domain,
            &id,
            payload,
            self.config.default_priority,
        )?;
        self.engine.write(batch)?;

        debug!("Wrote record {} in domain {} (op {})", id, domain, op.id);
        Ok(id)
    }

    /// Merge a partial payload into an existing record and enqueue the update.
    /// The enqueued operation carries the merged payload, so its replay is
    /// self-contained.
    pub fn update(&self, id: &str, domain: &str, partial_payload: JsonValue) -> StoreResult<()> {
        validate_tag("domain", domain)?;

        let mut record = self
            .records
            .get(id)?
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))?;
        if record.domain != domain {
            return Err(StoreError::RecordNotFound(id.to_string()));
        }

        merge_payload(&mut record.payload, partial_payload);
        record.updated_at = now_millis();
        record.synced = false;

        let mut batch = self.engine.batch();
        self.records.stage_put(&mut batch, &record)?;
        let op = self.queue.stage_enqueue(
            &mut batch,
            OperationKind::Update,
            domain,
            id,
            record.payload.clone(),
            self.config.default_priority,
        )?;
        self.engine.write(batch)?;

        debug!("Updated record {} in domain {} (op {})", id, domain, op.id);
        Ok(())
    }

    /// Remove a record locally and enqueue its delete operation.
    pub fn delete(&self, id: &str, domain: &str) -> StoreResult<()> {
        validate_tag("domain", domain)?;

        let record = self
            .records
            .get(id)?
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))?;
        if record.domain != domain {
            return Err(StoreError::RecordNotFound(id.to_string()));
        }

        let mut batch = self.engine.batch();
        self.records.stage_delete(&mut batch, &record);
        let op = self.queue.stage_enqueue(
            &mut batch,
            OperationKind::Delete,
            domain,
            id,
            serde_json::json!({ "id": id }),
            self.config.default_priority,
        )?;
        self.engine.write(batch)?;

        debug!("Deleted record {} in domain {} (op {})", id, domain, op.id);
        Ok(())
    }

    // ==================== Query API ====================

    /// The record's payload, or `None` when the id is unknown.
    pub fn get(&self, id: &str) -> StoreResult<Option<JsonValue>> {
        Ok(self.records.get(id)?.map(|r| r.payload))
    }

    pub fn get_record(&self, id: &str) -> StoreResult<Option<Record>> {
        self.records.get(id)
    }

    pub fn list_by_domain(
        &self,
        domain: &str,
        record_type: Option<&str>,
    ) -> StoreResult<Vec<Record>> {
        self.records.list_by_domain(domain, record_type)
    }

    pub fn pending_count(&self) -> StoreResult<usize> {
        self.queue.len()
    }

    /// All queued operations in drain order. Operations that exhausted their
    /// retries stay visible here until resolved out of band.
    pub fn pending_operations(&self) -> StoreResult<Vec<PendingOperation>> {
        self.queue.list_ordered()
    }

    pub fn sync_log_entries(
        &self,
        after_sequence: u64,
        limit: usize,
    ) -> StoreResult<Vec<SyncLogEntry>> {
        self.log.entries_after(after_sequence, limit)
    }

    // ==================== Sync control API ====================

    /// Run one reconciliation pass. Never fails; see [`SyncReport`].
    pub async fn trigger_sync(&self) -> SyncReport {
        self.sync.trigger_sync().await
    }

    pub fn subscribe_progress<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&u8) + Send + Sync + 'static,
    {
        self.sync.subscribe_progress(callback)
    }

    pub fn subscribe_connectivity<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.monitor.subscribe(callback)
    }

    /// Feed a platform connectivity signal into the store. The
    /// offline-to-online edge triggers exactly one reconciliation pass and
    /// returns its report; everything else returns `None`.
    pub async fn set_connectivity(&self, online: bool) -> Option<SyncReport> {
        let status = if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };

        if !self.monitor.transition(status) {
            return None;
        }
        if online {
            Some(self.sync.trigger_sync().await)
        } else {
            None
        }
    }

    pub fn connectivity(&self) -> Connectivity {
        self.monitor.status()
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    pub fn last_synced_at(&self) -> Option<u64> {
        self.sync.last_synced_at()
    }

    // ==================== Cache ====================

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Spawn the periodic cache sweeper on the current tokio runtime. The
    /// task exits on its own once the store is closed.
    pub fn spawn_cache_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let sweeper = Arc::new(CacheSweeper::new(
            self.cache.clone(),
            self.config.sweep_interval,
        ));
        tokio::spawn(sweeper.start())
    }

    /// The underlying engine, mainly for inspection in tests and tooling.
    pub fn engine(&self) -> &Arc<StorageEngine> {
        &self.engine
    }
}
