//! Sync reconciliation engine
//!
//! Drains the pending-operation queue against the remote endpoint, one
//! operation at a time, in priority/FIFO order. At most one pass runs at a
//! time: a trigger arriving while a pass is active is a no-op that reports
//! `{success: false, synced: 0, failed: 0}`. Per-operation failures are
//! isolated; they never abort the pass.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::error::StoreResult;
use crate::events::{EventBus, Subscription};
use crate::queue::{PendingOperation, PendingQueue};
use crate::storage::RecordStore;
use crate::sync::log::{SyncLog, SyncStatus};
use crate::sync::remote::RemoteEndpoint;

/// Per-operation failure surfaced in a [`SyncReport`].
///
/// `operation_id` is `None` for pass-level failures (e.g. the snapshot could
/// not be read at all).
#[derive(Debug, Clone)]
pub struct SyncOpError {
    pub operation_id: Option<String>,
    pub message: String,
    /// Eligible for another automatic attempt on a future pass
    pub recoverable: bool,
}

/// Outcome of one reconciliation pass.
///
/// Partial success (some synced, some failed) is a normal outcome;
/// `success` is only true when nothing failed.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub success: bool,
    pub synced: usize,
    pub failed: usize,
    pub errors: Vec<SyncOpError>,
    pub duration: Duration,
}

impl SyncReport {
    /// The no-op report returned when a pass cannot start (already syncing,
    /// or offline).
    fn skipped() -> Self {
        Self {
            success: false,
            synced: 0,
            failed: 0,
            errors: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    fn aborted(message: String, duration: Duration) -> Self {
        Self {
            success: false,
            synced: 0,
            failed: 0,
            errors: vec![SyncOpError {
                operation_id: None,
                message,
                recoverable: true,
            }],
            duration,
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The reconciliation engine. One instance per store; all state shared with
/// the mutation path lives in the injected components.
pub struct SyncEngine {
    records: RecordStore,
    queue: Arc<PendingQueue>,
    log: Arc<SyncLog>,
    remote: Arc<dyn RemoteEndpoint>,
    monitor: Arc<ConnectivityMonitor>,
    progress: EventBus<u8>,
    // At-most-one concurrent pass; claimed with try_lock, never awaited
    pass_guard: tokio::sync::Mutex<()>,
    max_retries: u32,
    // 0 = never completed a clean pass
    last_synced_at: AtomicU64,
}

impl SyncEngine {
    pub fn new(
        records: RecordStore,
        queue: Arc<PendingQueue>,
        log: Arc<SyncLog>,
        remote: Arc<dyn RemoteEndpoint>,
        monitor: Arc<ConnectivityMonitor>,
        max_retries: u32,
    ) -> Self {
        Self {
            records,
            queue,
            log,
            remote,
            monitor,
            progress: EventBus::new(),
            pass_guard: tokio::sync::Mutex::new(()),
            max_retries,
            last_synced_at: AtomicU64::new(0),
        }
    }

    /// Subscribe to progress events (integer percent, 0-100, monotonic within
    /// one pass).
    pub fn subscribe_progress<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&u8) + Send + Sync + 'static,
    {
        self.progress.subscribe(callback)
    }

    /// Millisecond timestamp of the last pass that completed without
    /// failures, if any.
    pub fn last_synced_at(&self) -> Option<u64> {
        match self.last_synced_at.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        }
    }

    /// Run one reconciliation pass over a snapshot of the pending queue.
    ///
    /// Never returns an error: the outcome, including pass-level failures, is
    /// always a structured [`SyncReport`].
    pub async fn trigger_sync(&self) -> SyncReport {
        if !self.monitor.is_online() {
            debug!("Sync requested while offline, skipping");
            return SyncReport::skipped();
        }

        // Hard invariant: a second trigger during an active pass is rejected,
        // not queued.
        let _guard = match self.pass_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Sync already in progress, skipping");
                return SyncReport::skipped();
            }
        };

        let started = Instant::now();

        // The snapshot is fixed for this pass; operations enqueued from here
        // on wait for the next pass.
        let snapshot = match self.queue.list_ordered() {
            Ok(ops) => ops,
            Err(e) => {
                error!("Failed to snapshot pending queue: {}", e);
                return SyncReport::aborted(
                    format!("Failed to snapshot pending queue: {}", e),
                    started.elapsed(),
                );
            }
        };

        let total = snapshot.len();
        info!("Starting reconciliation pass: {} pending operations", total);

        let mut synced = 0usize;
        let mut failed = 0usize;
        let mut errors: Vec<SyncOpError> = Vec::new();

        for (index, op) in snapshot.iter().enumerate() {
            if op.retry_count >= self.max_retries {
                // Automatic retry stops at the cap; the operation stays
                // queued and is surfaced for manual attention.
                warn!(
                    "Operation {} has exhausted its {} retries, leaving queued",
                    op.id, self.max_retries
                );
                failed += 1;
                errors.push(SyncOpError {
                    operation_id: Some(op.id.clone()),
                    message: "retry limit reached".to_string(),
                    recoverable: false,
                });
                if let Err(e) = self.log.append(op, SyncStatus::Failed, Some("retry limit reached"))
                {
                    warn!("Failed to journal skipped operation {}: {}", op.id, e);
                }
            } else {
                match self.remote.reconcile(op).await {
                    Ok(()) => match self.acknowledge(op) {
                        Ok(()) => synced += 1,
                        Err(e) => {
                            error!("Failed to settle acknowledged operation {}: {}", op.id, e);
                            failed += 1;
                            errors.push(SyncOpError {
                                operation_id: Some(op.id.clone()),
                                message: format!("Storage error after acknowledgment: {}", e),
                                recoverable: true,
                            });
                        }
                    },
                    Err(remote_err) => {
                        // Classified before the increment: still below the cap
                        // here, so another pass may retry it.
                        debug!("Operation {} rejected by remote: {}", op.id, remote_err);
                        if let Err(e) = self.queue.increment_retry(&op.id) {
                            warn!("Failed to bump retry count for {}: {}", op.id, e);
                        }
                        if let Err(e) =
                            self.log
                                .append(op, SyncStatus::Failed, Some(&remote_err.message))
                        {
                            warn!("Failed to journal failed operation {}: {}", op.id, e);
                        }
                        failed += 1;
                        errors.push(SyncOpError {
                            operation_id: Some(op.id.clone()),
                            message: remote_err.message,
                            recoverable: true,
                        });
                    }
                }
            }

            let percent = ((index + 1) * 100 / total) as u8;
            self.progress.publish(&percent);
        }

        // Records whose last referencing operation just drained converge to
        // synced=true.
        match self.converge_synced_flags() {
            Ok(flipped) if flipped > 0 => {
                debug!("Marked {} records synced", flipped);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Synced-flag convergence failed: {}", e);
                errors.push(SyncOpError {
                    operation_id: None,
                    message: format!("Synced-flag convergence failed: {}", e),
                    recoverable: true,
                });
            }
        }

        self.progress.publish(&100);

        let duration = started.elapsed();
        let success = failed == 0 && errors.is_empty();
        if success {
            self.last_synced_at.store(now_millis(), Ordering::Relaxed);
        }

        info!(
            "Reconciliation pass complete: {} synced, {} failed in {:?}",
            synced, failed, duration
        );

        SyncReport {
            success,
            synced,
            failed,
            errors,
            duration,
        }
    }

    /// Settle one remotely acknowledged operation: drop it from the queue and
    /// journal the success.
    fn acknowledge(&self, op: &PendingOperation) -> StoreResult<()> {
        self.queue.remove(&op.id)?;
        if let Err(e) = self.log.append(op, SyncStatus::Success, None) {
            warn!("Failed to journal acknowledged operation {}: {}", op.id, e);
        }
        Ok(())
    }

    fn converge_synced_flags(&self) -> StoreResult<usize> {
        let still_pending = self.queue.record_ids_with_pending()?;

        let mut flipped = 0;
        for record in self.records.unsynced()? {
            if !still_pending.contains(&record.id) {
                self.records.mark_synced(&record.id)?;
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}
