//! Operator settings for the CLI
//!
//! Everything is environment-driven with sensible defaults; the
//! checkpoint file itself carries the runtime-toggleable flags.

use gleaner_common::{GleanerError, Result};
use gleaner_engine::EngineConfig;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// CLI Settings Constants
// ============================================================================

/// Default feed URL when not specified via environment variable.
pub const DEFAULT_FEED_URL: &str = "http://localhost:8000";

/// Default data directory when not specified via environment variable.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// CLI settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the message feed API
    pub feed_url: String,

    /// Optional bearer token for the feed API
    pub feed_token: Option<String>,

    /// Engine tunables (data dir, concurrency, batching, cadence)
    pub engine: EngineConfig,
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// - `GLEANER_FEED_URL`: feed API base URL
    /// - `GLEANER_FEED_TOKEN`: bearer token for the feed API
    /// - `GLEANER_DATA_DIR`: root directory for channel partitions
    /// - `GLEANER_MAX_CONCURRENT_DOWNLOADS`: media download limiter size
    /// - `GLEANER_BATCH_SIZE`: records per batch flush
    /// - `GLEANER_CHECKPOINT_INTERVAL`: items between checkpoint saves
    /// - `GLEANER_POLL_INTERVAL_SECS`: continuous-poll cycle length
    pub fn from_env() -> Result<Self> {
        let mut engine = EngineConfig {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            ..Default::default()
        };

        if let Ok(dir) = std::env::var("GLEANER_DATA_DIR") {
            engine.data_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = std::env::var("GLEANER_MAX_CONCURRENT_DOWNLOADS") {
            engine.max_concurrent_downloads = parse_env("GLEANER_MAX_CONCURRENT_DOWNLOADS", &raw)?;
        }
        if let Ok(raw) = std::env::var("GLEANER_BATCH_SIZE") {
            engine.batch_size = parse_env("GLEANER_BATCH_SIZE", &raw)?;
        }
        if let Ok(raw) = std::env::var("GLEANER_CHECKPOINT_INTERVAL") {
            engine.checkpoint_interval = parse_env("GLEANER_CHECKPOINT_INTERVAL", &raw)?;
        }
        if let Ok(raw) = std::env::var("GLEANER_POLL_INTERVAL_SECS") {
            engine.poll_interval = Duration::from_secs(parse_env("GLEANER_POLL_INTERVAL_SECS", &raw)?);
        }
        engine.validate()?;

        let feed_url =
            std::env::var("GLEANER_FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string());
        let feed_token = std::env::var("GLEANER_FEED_TOKEN").ok();

        Ok(Self {
            feed_url,
            feed_token,
            engine,
        })
    }

    /// Path of the checkpoint file under the data directory.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.engine.data_dir.join("checkpoint.json")
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| GleanerError::config(format!("{} has invalid value '{}'", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment mutation is process-wide, so everything touching it lives
    // in one test to keep the suite parallel-safe.
    #[test]
    fn test_env_defaults_and_overrides() {
        std::env::remove_var("GLEANER_FEED_URL");
        std::env::remove_var("GLEANER_DATA_DIR");
        std::env::remove_var("GLEANER_BATCH_SIZE");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.feed_url, DEFAULT_FEED_URL);
        assert_eq!(settings.engine.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert!(settings.checkpoint_path().ends_with("checkpoint.json"));

        std::env::set_var("GLEANER_BATCH_SIZE", "250");
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.engine.batch_size, 250);

        std::env::set_var("GLEANER_BATCH_SIZE", "lots");
        assert!(Settings::from_env().is_err());
        std::env::remove_var("GLEANER_BATCH_SIZE");
    }
}
