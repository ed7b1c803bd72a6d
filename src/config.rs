use std::path::PathBuf;
use std::time::Duration;

/// Retry cap for a pending operation before it is surfaced as non-recoverable.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default priority for enqueued operations (lower = more urgent).
pub const DEFAULT_PRIORITY: i32 = 5;

/// Configuration for an [`crate::store::OfflineStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory for the RocksDB data files
    pub data_dir: PathBuf,
    /// Maximum automatic retries per pending operation
    pub max_retries: u32,
    /// Priority assigned to operations enqueued through the mutation API
    pub default_priority: i32,
    /// Interval between background cache sweeps
    pub sweep_interval: Duration,
}

impl StoreConfig {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            default_priority: DEFAULT_PRIORITY,
            sweep_interval: Duration::from_secs(60),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_default_priority(mut self, priority: i32) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = StoreConfig::new("/tmp/satchel");

        assert_eq!(config.data_dir, PathBuf::from("/tmp/satchel"));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.default_priority, 5);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_config_builders() {
        let config = StoreConfig::new("/tmp/satchel")
            .with_max_retries(5)
            .with_default_priority(1)
            .with_sweep_interval(Duration::from_secs(5));

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.default_priority, 1);
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
    }
}
