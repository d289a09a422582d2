//! Crawl orchestrator
//!
//! One pass over one channel: pull the item stream from the channel's cursor,
//! batch records into the channel's partition, hand media off to the fetch
//! scheduler, and advance the checkpoint. Ordering and durability rules:
//!
//! - records are batched strictly in increasing item-id order;
//! - the cursor is checkpointed periodically while the stream is consumed,
//!   without waiting on in-flight media (liveness saves; the crash window
//!   this opens is covered by the reconciliation pass);
//! - all media tasks of the pass are awaited before the final cursor save;
//! - a malformed item is logged and skipped, a channel-level failure aborts
//!   only this channel's pass, and a record-store failure always propagates.

use futures::StreamExt;
use gleaner_common::ChannelId;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::config::EngineConfig;
use crate::media::{FetchError, MediaFetcher};
use crate::store::{MessageRecord, RecordStore, StoreError};
use crate::stream::{MediaFetchTask, MessageStream, StreamError};

/// Error that aborts a single channel's pass. Sibling channels are unaffected.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("channel pass aborted: {0}")]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one crawl pass over one channel.
#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    /// Pending items the source reported before the pass.
    pub total_pending: u64,
    /// Items consumed from the stream.
    pub processed: u64,
    /// Malformed items logged and skipped.
    pub skipped: u64,
    /// Rows actually inserted (duplicates from a replay are not counted).
    pub inserted: u64,
    /// Media tasks handed to the scheduler.
    pub media_submitted: u64,
    /// Media tasks that resolved to a file.
    pub media_fetched: u64,
    /// Media tasks that exhausted retries; left for reconciliation.
    pub media_missing: u64,
    /// Channel cursor after the pass.
    pub cursor: i64,
}

/// Incremental progress callbacks for a pass.
///
/// Implementations must be cheap; they are invoked per item and per resolved
/// media task.
pub trait ProgressObserver: Send + Sync {
    fn on_items(&self, _processed: u64, _total: u64) {}
    fn on_media(&self, _completed: u64, _submitted: u64) {}
}

/// Observer that reports nothing.
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// Drives crawl passes against one message source and one record store.
pub struct Harvester {
    pub(crate) stream: Arc<dyn MessageStream>,
    pub(crate) store: Arc<RecordStore>,
    pub(crate) fetcher: MediaFetcher,
    pub(crate) config: EngineConfig,
}

impl Harvester {
    pub fn new(
        stream: Arc<dyn MessageStream>,
        store: Arc<RecordStore>,
        config: EngineConfig,
    ) -> Self {
        let fetcher = MediaFetcher::new(stream.clone(), &config);
        Self {
            stream,
            store,
            fetcher,
            config,
        }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one pass over `channel` from its checkpointed cursor.
    pub async fn crawl_channel(
        &self,
        checkpoint: &mut CheckpointStore,
        channel: &ChannelId,
        progress: &dyn ProgressObserver,
    ) -> Result<CrawlReport, CrawlError> {
        let from = checkpoint.cursor(channel);
        let total = self.stream.pending_count(channel, from).await?;

        let mut report = CrawlReport {
            total_pending: total,
            cursor: from,
            ..Default::default()
        };

        if total == 0 {
            debug!(channel = %channel, cursor = from, "No pending items");
            return Ok(report);
        }

        info!(channel = %channel, cursor = from, pending = total, "Starting crawl pass");

        let media_dir = self.store.media_dir(channel);
        let mut items = self.stream.items(channel, from).await?;
        let mut batch: Vec<MessageRecord> = Vec::with_capacity(self.config.batch_size);
        let mut media_tasks: Vec<(i64, JoinHandle<Result<std::path::PathBuf, FetchError>>)> =
            Vec::new();
        let mut last_id = from;

        while let Some(next) = items.next().await {
            let item = match next {
                Ok(item) => item,
                Err(e) if !e.aborts_pass() => {
                    warn!(channel = %channel, error = %e, "Skipping malformed item");
                    report.skipped += 1;
                    continue;
                },
                Err(e) => {
                    // Channel-level failure: stop this pass. Whatever was
                    // already flushed and checkpointed stands; in-flight
                    // media is cancelled (partial files never land on the
                    // final path) and re-derived on the next pass.
                    for (_, handle) in &media_tasks {
                        handle.abort();
                    }
                    warn!(channel = %channel, error = %e, "Channel pass aborted");
                    return Err(e.into());
                },
            };

            let record = MessageRecord::from_item(&item);

            if let Some(descriptor) = &item.media {
                if checkpoint.media_enabled() && descriptor.kind.downloadable() {
                    let handle = self
                        .fetcher
                        .submit(MediaFetchTask {
                            channel: channel.clone(),
                            message_id: item.id,
                            descriptor: descriptor.clone(),
                            media_dir: media_dir.clone(),
                        })
                        .await;
                    media_tasks.push((item.id, handle));
                    report.media_submitted += 1;
                }
            }

            batch.push(record);
            last_id = item.id;
            report.processed += 1;

            if batch.len() >= self.config.batch_size {
                report.inserted += self.store.insert_batch(channel, &batch).await?;
                batch.clear();
            }

            if report.processed % self.config.checkpoint_interval as u64 == 0 {
                // Liveness checkpoint: flush what we have so the saved cursor
                // is a valid resume point, but do not wait on media.
                if !batch.is_empty() {
                    report.inserted += self.store.insert_batch(channel, &batch).await?;
                    batch.clear();
                }
                checkpoint.advance(channel, last_id);
            }

            progress.on_items(report.processed, total);
        }

        if !batch.is_empty() {
            report.inserted += self.store.insert_batch(channel, &batch).await?;
        }

        // Join barrier: every media task of this pass resolves (to a path or
        // to a missing-media outcome) before the final cursor is persisted.
        let submitted = media_tasks.len() as u64;
        if submitted > 0 {
            info!(channel = %channel, media = submitted, "Waiting for media downloads");
        }
        for (done, (message_id, handle)) in media_tasks.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(path)) => {
                    self.store
                        .update_media_path(channel, message_id, &path.to_string_lossy())
                        .await?;
                    report.media_fetched += 1;
                },
                Ok(Err(e)) => {
                    warn!(channel = %channel, message_id, error = %e, "Media missing");
                    report.media_missing += 1;
                },
                Err(e) => {
                    warn!(channel = %channel, message_id, error = %e, "Media task did not complete");
                    report.media_missing += 1;
                },
            }
            progress.on_media(done as u64 + 1, submitted);
        }

        checkpoint.advance(channel, last_id);
        report.cursor = checkpoint.cursor(channel);

        info!(
            channel = %channel,
            processed = report.processed,
            inserted = report.inserted,
            skipped = report.skipped,
            media_fetched = report.media_fetched,
            media_missing = report.media_missing,
            cursor = report.cursor,
            "Crawl pass complete"
        );

        Ok(report)
    }
}
