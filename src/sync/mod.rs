pub mod engine;
pub mod log;
pub mod remote;

pub use engine::{SyncEngine, SyncOpError, SyncReport};
pub use log::{SyncLog, SyncLogEntry, SyncStatus};
pub use remote::{HttpEndpoint, RemoteEndpoint, RemoteError};
