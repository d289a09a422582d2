//! Media reconciliation pass
//!
//! A follow-up crawl targeting only records whose media never resolved:
//! the liveness-checkpoint trade-off in the crawl orchestrator means a crash
//! can leave already-passed messages without media, and a failed download is
//! recorded as missing rather than retried forever. This pass re-drives those
//! fetches through the same bounded scheduler and folds resolved paths back
//! into the record store.

use gleaner_common::ChannelId;
use tracing::{info, warn};

use crate::crawl::{CrawlError, Harvester};
use crate::stream::{MediaDescriptor, MediaFetchTask};

/// How many missing-media records are fetched per scheduling wave.
const RECONCILE_WAVE: usize = 50;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Records with missing media at the start of the pass.
    pub targeted: u64,
    /// Downloads that resolved and were recorded.
    pub recovered: u64,
    /// Downloads that exhausted retries again.
    pub still_missing: u64,
}

impl Harvester {
    /// Re-attempt every missing media download for `channel`.
    ///
    /// The destination name falls back to the kind-derived extension: the
    /// original suggested file name is not persisted, so a reconciled file
    /// may land under a different name than a first-pass download would have.
    pub async fn reconcile_channel(
        &self,
        channel: &ChannelId,
    ) -> Result<ReconcileReport, CrawlError> {
        let missing = self.store.list_missing_media(channel).await?;
        let mut report = ReconcileReport {
            targeted: missing.len() as u64,
            ..Default::default()
        };

        if missing.is_empty() {
            info!(channel = %channel, "No missing media to reconcile");
            return Ok(report);
        }

        info!(channel = %channel, targeted = report.targeted, "Reconciling missing media");
        let media_dir = self.store.media_dir(channel);

        for wave in missing.chunks(RECONCILE_WAVE) {
            let mut handles = Vec::with_capacity(wave.len());
            for (message_id, kind) in wave {
                let handle = self
                    .fetcher
                    .submit(MediaFetchTask {
                        channel: channel.clone(),
                        message_id: *message_id,
                        descriptor: MediaDescriptor {
                            kind: *kind,
                            file_name: None,
                        },
                        media_dir: media_dir.clone(),
                    })
                    .await;
                handles.push((*message_id, handle));
            }

            for (message_id, handle) in handles {
                match handle.await {
                    Ok(Ok(path)) => {
                        self.store
                            .update_media_path(channel, message_id, &path.to_string_lossy())
                            .await?;
                        report.recovered += 1;
                    },
                    Ok(Err(e)) => {
                        warn!(channel = %channel, message_id, error = %e, "Media still missing");
                        report.still_missing += 1;
                    },
                    Err(e) => {
                        warn!(channel = %channel, message_id, error = %e, "Reconcile task did not complete");
                        report.still_missing += 1;
                    },
                }
            }
        }

        info!(
            channel = %channel,
            recovered = report.recovered,
            still_missing = report.still_missing,
            "Reconciliation complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointStore;
    use crate::config::EngineConfig;
    use crate::crawl::NoProgress;
    use crate::store::RecordStore;
    use crate::stream::{
        ItemStream, MediaKind, MessageStream, Sender, StreamError, StreamItem,
    };
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Adapter whose media endpoint can be flipped between failing and
    /// working, to model an outage healing between passes.
    struct FlakyMedia {
        healthy: AtomicBool,
        fetches: AtomicU32,
    }

    #[async_trait]
    impl MessageStream for FlakyMedia {
        async fn pending_count(&self, _: &ChannelId, after: i64) -> Result<u64, StreamError> {
            Ok(if after < 2 { 2 } else { 0 })
        }

        async fn items(&self, _: &ChannelId, after: i64) -> Result<ItemStream<'_>, StreamError> {
            let items: Vec<Result<StreamItem, StreamError>> = (after + 1..=2)
                .map(|id| {
                    Ok(StreamItem {
                        id,
                        timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
                        sender: Sender::default(),
                        body: String::new(),
                        media: Some(MediaDescriptor {
                            kind: MediaKind::Photo,
                            file_name: None,
                        }),
                        reply_to: None,
                    })
                })
                .collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }

        async fn fetch_media(
            &self,
            _: &ChannelId,
            _: i64,
            dest: &Path,
        ) -> Result<(), StreamError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(StreamError::Transport("media endpoint down".into()));
            }
            tokio::fs::write(dest, b"media").await.map_err(|e| {
                StreamError::Transport(e.to_string())
            })
        }
    }

    #[tokio::test]
    async fn test_reconcile_recovers_missing_media() {
        let dir = TempDir::new().unwrap();
        let stream = Arc::new(FlakyMedia {
            healthy: AtomicBool::new(false),
            fetches: AtomicU32::new(0),
        });
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            fetch_base_backoff: std::time::Duration::from_millis(1),
            ..Default::default()
        };
        let store = Arc::new(RecordStore::new(dir.path()));
        let harvester = Harvester::new(stream.clone(), store.clone(), config);
        let ch = ChannelId::new("alpha").unwrap();

        let mut checkpoint = CheckpointStore::load(dir.path().join("checkpoint.json"));
        checkpoint.add_channel(ch.clone());

        // Crawl while the media endpoint is down: text lands, media missing.
        let report = harvester
            .crawl_channel(&mut checkpoint, &ch, &NoProgress)
            .await
            .unwrap();
        assert_eq!(report.media_missing, 2);
        assert_eq!(store.count_missing_media(&ch).await.unwrap(), 2);

        // Endpoint heals; reconciliation recovers both.
        stream.healthy.store(true, Ordering::SeqCst);
        let reconciled = harvester.reconcile_channel(&ch).await.unwrap();
        assert_eq!(reconciled.targeted, 2);
        assert_eq!(reconciled.recovered, 2);
        assert_eq!(reconciled.still_missing, 0);
        assert_eq!(store.count_missing_media(&ch).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_with_nothing_missing_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let stream = Arc::new(FlakyMedia {
            healthy: AtomicBool::new(true),
            fetches: AtomicU32::new(0),
        });
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let harvester =
            Harvester::new(stream.clone(), Arc::new(RecordStore::new(dir.path())), config);
        let ch = ChannelId::new("alpha").unwrap();

        let report = harvester.reconcile_channel(&ch).await.unwrap();
        assert_eq!(report.targeted, 0);
        assert_eq!(stream.fetches.load(Ordering::SeqCst), 0);
    }
}
