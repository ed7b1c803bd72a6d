pub mod engine;
pub mod record;

pub use engine::{Collection, StorageEngine, StoreBatch};
pub use record::{Record, RecordStore};
