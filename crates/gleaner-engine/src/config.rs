//! Engine configuration

use gleaner_common::{GleanerError, Result};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Engine Defaults
// ============================================================================

/// Default number of media downloads allowed in flight at once.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;

/// Default number of records buffered before a batch flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default number of processed items between liveness checkpoint saves.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 50;

/// Default continuous-poll cycle length.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default total attempts per media fetch (first try included).
pub const DEFAULT_FETCH_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff between fetch attempts.
pub const DEFAULT_FETCH_BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Tunables for the ingestion engine.
///
/// `media_enabled` is deliberately absent: it lives in the persisted
/// checkpoint state so operators can toggle it between (and during) runs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory holding one subdirectory per channel.
    pub data_dir: PathBuf,

    /// Maximum media downloads in flight at once (>= 1).
    pub max_concurrent_downloads: usize,

    /// Records buffered before a batch flush to the record store.
    pub batch_size: usize,

    /// Processed items between liveness checkpoint saves.
    pub checkpoint_interval: usize,

    /// Continuous-poll cycle length.
    pub poll_interval: Duration,

    /// Total attempts per media fetch.
    pub fetch_max_attempts: u32,

    /// Base delay for exponential backoff between fetch attempts.
    pub fetch_base_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            batch_size: DEFAULT_BATCH_SIZE,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fetch_max_attempts: DEFAULT_FETCH_MAX_ATTEMPTS,
            fetch_base_backoff: DEFAULT_FETCH_BASE_BACKOFF,
        }
    }
}

impl EngineConfig {
    /// Validate operator-supplied values.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == 0 {
            return Err(GleanerError::config(
                "max_concurrent_downloads must be at least 1",
            ));
        }
        if self.batch_size == 0 {
            return Err(GleanerError::config("batch_size must be at least 1"));
        }
        if self.checkpoint_interval == 0 {
            return Err(GleanerError::config(
                "checkpoint_interval must be at least 1",
            ));
        }
        if self.fetch_max_attempts == 0 {
            return Err(GleanerError::config(
                "fetch_max_attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = EngineConfig {
            max_concurrent_downloads: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = EngineConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
