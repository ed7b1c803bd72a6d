use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record '{0}' not found")]
    RecordNotFound(String),

    #[error("Pending operation '{0}' not found")]
    OperationNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store is closed")]
    Closed,
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        StoreError::Storage(err.into())
    }
}
