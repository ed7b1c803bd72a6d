pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod events;
pub mod queue;
pub mod storage;
pub mod store;
pub mod sync;

pub use cache::{CacheEntry, CacheStore, CacheSweeper};
pub use config::{StoreConfig, DEFAULT_MAX_RETRIES, DEFAULT_PRIORITY};
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use error::{StoreError, StoreResult};
pub use events::{EventBus, Subscription};
pub use queue::{OperationKind, PendingOperation, PendingQueue};
pub use storage::{Collection, Record, RecordStore, StorageEngine, StoreBatch};
pub use store::OfflineStore;
pub use sync::{
    HttpEndpoint, RemoteEndpoint, RemoteError, SyncEngine, SyncLog, SyncLogEntry, SyncOpError,
    SyncReport, SyncStatus,
};
