//! Common test utilities
//!
//! Provides shared helpers for:
//! - Creating temp-backed storage engines and stores
//! - A scriptable mock remote endpoint

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use satchel::{
    OfflineStore, PendingOperation, RemoteEndpoint, RemoteError, StorageEngine, StoreConfig,
};

/// Honor RUST_LOG in test runs; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn create_test_engine() -> (Arc<StorageEngine>, TempDir) {
    init_tracing();
    let tmp_dir = TempDir::new().expect("Failed to create temp dir");
    let engine = StorageEngine::open(tmp_dir.path()).expect("Failed to open storage engine");
    (Arc::new(engine), tmp_dir)
}

pub fn open_store(remote: Arc<MockEndpoint>) -> (OfflineStore, TempDir) {
    init_tracing();
    let tmp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = OfflineStore::open(StoreConfig::new(tmp_dir.path()), remote)
        .expect("Failed to open store");
    (store, tmp_dir)
}

pub fn rejection(message: &str) -> RemoteError {
    RemoteError {
        status: Some(500),
        message: message.to_string(),
    }
}

/// Scriptable remote endpoint. Scripted responses are consumed one per call,
/// FIFO; once the script runs dry every call gets the default response.
pub struct MockEndpoint {
    script: Mutex<VecDeque<Result<(), RemoteError>>>,
    default: Result<(), RemoteError>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockEndpoint {
    pub fn accepting() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Ok(()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn rejecting(message: &str) -> Self {
        Self {
            default: Err(rejection(message)),
            ..Self::accepting()
        }
    }

    pub fn with_script(responses: Vec<Result<(), RemoteError>>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            ..Self::accepting()
        }
    }

    /// Delay each call, to hold a reconciliation pass open.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Operation ids in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl RemoteEndpoint for MockEndpoint {
    async fn reconcile(&self, op: &PendingOperation) -> Result<(), RemoteError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().push(op.id.clone());
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.default.clone())
    }
}
