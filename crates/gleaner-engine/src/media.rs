//! Media fetch scheduler
//!
//! Downloads media referenced by ingested messages under a shared concurrency
//! limiter. Each task is idempotent: destinations are deterministic per
//! message id, and an existing file short-circuits the network entirely.
//!
//! Retry policy distinguishes the remote's rate-limit signal (sleep exactly
//! the mandated duration) from generic transient failures (exponential
//! backoff, base delay doubling per attempt). Both classes share one bounded
//! attempt counter. An exhausted task resolves to a failure that the caller
//! records as missing media; it never aborts the pass that submitted it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::stream::{MediaFetchTask, MessageStream, StreamError};

/// Terminal failure of one media fetch task.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("download failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("destination io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bounded-concurrency runner for [`MediaFetchTask`]s.
///
/// Cheap to clone; clones share the same limiter.
#[derive(Clone)]
pub struct MediaFetcher {
    stream: Arc<dyn MessageStream>,
    limiter: Arc<Semaphore>,
    max_attempts: u32,
    base_backoff: Duration,
}

impl MediaFetcher {
    pub fn new(stream: Arc<dyn MessageStream>, config: &EngineConfig) -> Self {
        Self {
            stream,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_downloads)),
            max_attempts: config.fetch_max_attempts,
            base_backoff: config.fetch_base_backoff,
        }
    }

    /// Submit one fetch task.
    ///
    /// Acquires a limiter permit before spawning, so submission suspends only
    /// when the limiter is saturated - a full queue alone never blocks the
    /// submitting pass. The permit is held for the task's whole lifetime.
    pub async fn submit(&self, task: MediaFetchTask) -> JoinHandle<Result<PathBuf, FetchError>> {
        let permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .expect("media limiter closed");

        let stream = self.stream.clone();
        let max_attempts = self.max_attempts;
        let base_backoff = self.base_backoff;

        tokio::spawn(async move {
            let result = fetch_with_retry(stream, &task, max_attempts, base_backoff).await;
            drop(permit);
            result
        })
    }
}

async fn fetch_with_retry(
    stream: Arc<dyn MessageStream>,
    task: &MediaFetchTask,
    max_attempts: u32,
    base_backoff: Duration,
) -> Result<PathBuf, FetchError> {
    let dest = task.media_dir.join(task.descriptor.destination_name(task.message_id));

    // Idempotence: a completed earlier run already produced this file.
    if tokio::fs::try_exists(&dest).await? {
        debug!(
            channel = %task.channel,
            message_id = task.message_id,
            path = %dest.display(),
            "Media already present, skipping download"
        );
        return Ok(dest);
    }

    tokio::fs::create_dir_all(&task.media_dir).await?;

    let mut last_error = String::new();
    for attempt in 1..=max_attempts {
        match stream
            .fetch_media(&task.channel, task.message_id, &dest)
            .await
        {
            Ok(()) => {
                debug!(
                    channel = %task.channel,
                    message_id = task.message_id,
                    attempt,
                    path = %dest.display(),
                    "Media downloaded"
                );
                return Ok(dest);
            },
            Err(StreamError::RateLimited { wait }) => {
                last_error = format!("rate limited ({}s mandated wait)", wait.as_secs());
                if attempt < max_attempts {
                    warn!(
                        channel = %task.channel,
                        message_id = task.message_id,
                        attempt,
                        max_attempts,
                        wait_secs = wait.as_secs(),
                        "Rate limited, honoring mandated wait before retry"
                    );
                    tokio::time::sleep(wait).await;
                }
            },
            Err(e) => {
                last_error = e.to_string();
                if attempt < max_attempts {
                    let delay = base_backoff * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        channel = %task.channel,
                        message_id = task.message_id,
                        attempt,
                        max_attempts,
                        delay_secs = delay.as_secs(),
                        error = %last_error,
                        "Media download failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            },
        }
    }

    warn!(
        channel = %task.channel,
        message_id = task.message_id,
        attempts = max_attempts,
        error = %last_error,
        "Media download exhausted retries, recording as missing"
    );
    Err(FetchError::Exhausted {
        attempts: max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ItemStream, MediaDescriptor, MediaKind};
    use async_trait::async_trait;
    use gleaner_common::ChannelId;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::time::Instant;

    /// Fake adapter whose fetch behavior is scripted per test.
    struct FakeFetch {
        calls: AtomicU32,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        // Fail this many calls before succeeding; u32::MAX = always rate limit.
        failures_before_success: u32,
        rate_limit_wait: Option<Duration>,
        hold: Duration,
    }

    impl FakeFetch {
        fn succeeding() -> Self {
            Self {
                calls: AtomicU32::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                failures_before_success: 0,
                rate_limit_wait: None,
                hold: Duration::ZERO,
            }
        }

        fn failing_first(n: u32) -> Self {
            Self {
                failures_before_success: n,
                ..Self::succeeding()
            }
        }

        fn always_rate_limited(wait: Duration) -> Self {
            Self {
                failures_before_success: u32::MAX,
                rate_limit_wait: Some(wait),
                ..Self::succeeding()
            }
        }

        fn slow(hold: Duration) -> Self {
            Self {
                hold,
                ..Self::succeeding()
            }
        }
    }

    #[async_trait]
    impl MessageStream for FakeFetch {
        async fn pending_count(&self, _: &ChannelId, _: i64) -> Result<u64, StreamError> {
            unreachable!("not used by fetcher tests")
        }

        async fn items(&self, _: &ChannelId, _: i64) -> Result<ItemStream<'_>, StreamError> {
            unreachable!("not used by fetcher tests")
        }

        async fn fetch_media(
            &self,
            _channel: &ChannelId,
            _message_id: i64,
            dest: &Path,
        ) -> Result<(), StreamError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if !self.hold.is_zero() {
                tokio::time::sleep(self.hold).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err(match self.rate_limit_wait {
                    Some(wait) => StreamError::RateLimited { wait },
                    None => StreamError::Transport("connection reset".into()),
                });
            }
            tokio::fs::write(dest, b"bytes").await.map_err(|e| {
                StreamError::Transport(e.to_string())
            })
        }
    }

    fn task(dir: &TempDir, message_id: i64) -> MediaFetchTask {
        MediaFetchTask {
            channel: ChannelId::new("alpha").unwrap(),
            message_id,
            descriptor: MediaDescriptor {
                kind: MediaKind::Photo,
                file_name: None,
            },
            media_dir: dir.path().join("media"),
        }
    }

    fn fetcher(stream: Arc<dyn MessageStream>, permits: usize) -> MediaFetcher {
        let config = EngineConfig {
            max_concurrent_downloads: permits,
            ..Default::default()
        };
        MediaFetcher::new(stream, &config)
    }

    #[tokio::test]
    async fn test_existing_file_short_circuits() {
        let dir = TempDir::new().unwrap();
        let stream = Arc::new(FakeFetch::succeeding());
        let f = fetcher(stream.clone(), 2);

        let media_dir = dir.path().join("media");
        tokio::fs::create_dir_all(&media_dir).await.unwrap();
        tokio::fs::write(media_dir.join("7.jpg"), b"already here")
            .await
            .unwrap();

        let path = f.submit(task(&dir, 7)).await.await.unwrap().unwrap();
        assert!(path.ends_with("7.jpg"));
        assert_eq!(stream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success_backs_off_exponentially() {
        let dir = TempDir::new().unwrap();
        let stream = Arc::new(FakeFetch::failing_first(2));
        let f = fetcher(stream.clone(), 1);

        let started = Instant::now();
        let path = f.submit(task(&dir, 1)).await.await.unwrap().unwrap();

        // Two backoff sleeps: 1s after attempt 1, 2s after attempt 2.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(stream.calls.load(Ordering::SeqCst), 3);
        assert!(path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_sleeps_exactly_the_mandated_wait() {
        let dir = TempDir::new().unwrap();
        let stream = Arc::new(FakeFetch::always_rate_limited(Duration::from_secs(5)));
        let f = fetcher(stream.clone(), 1);

        let started = Instant::now();
        let result = f.submit(task(&dir, 1)).await.await.unwrap();

        // Three attempts, a 5s mandated wait after each of the first two -
        // never an exponential value.
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(stream.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(FetchError::Exhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded_by_limiter() {
        let dir = TempDir::new().unwrap();
        let stream = Arc::new(FakeFetch::slow(Duration::from_millis(50)));
        let f = fetcher(stream.clone(), 3);

        let mut handles = Vec::new();
        for id in 0..20 {
            handles.push(f.submit(task(&dir, id)).await);
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(stream.max_in_flight.load(Ordering::SeqCst), 3);
        assert_eq!(stream.calls.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let dir = TempDir::new().unwrap();
        let stream = Arc::new(FakeFetch::failing_first(u32::MAX));
        let config = EngineConfig {
            max_concurrent_downloads: 1,
            fetch_base_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let f = MediaFetcher::new(stream, &config);

        let err = f.submit(task(&dir, 1)).await.await.unwrap().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("after 3 attempts"), "got: {msg}");
        assert!(msg.contains("connection reset"), "got: {msg}");
    }
}
