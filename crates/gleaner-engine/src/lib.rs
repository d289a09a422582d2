//! Gleaner Ingestion Engine
//!
//! Incremental, crash-tolerant ingestion of ordered message streams into
//! per-channel SQLite partitions, with bounded-concurrency media downloads
//! and a continuous polling loop.
//!
//! # Overview
//!
//! - [`stream`]: the message-source seam ([`stream::MessageStream`]) plus the
//!   [`http::HttpFeedStream`] adapter for JSON feed APIs
//! - [`checkpoint`]: persisted channel -> cursor map; the resume point
//! - [`store`]: per-channel record partitions with idempotent batch inserts
//! - [`media`]: rate-limit-aware bounded download scheduler
//! - [`crawl`]: one checkpointed pass over one channel
//! - [`reconcile`]: re-drive downloads for records with missing media
//! - [`poll`]: fixed-cadence loop over all channels until cancelled
//!
//! # Example
//!
//! ```no_run
//! use gleaner_engine::checkpoint::CheckpointStore;
//! use gleaner_engine::config::EngineConfig;
//! use gleaner_engine::crawl::{Harvester, NoProgress};
//! use gleaner_engine::http::HttpFeedStream;
//! use gleaner_engine::store::RecordStore;
//! use gleaner_common::ChannelId;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::default();
//!     let stream = Arc::new(HttpFeedStream::new("http://localhost:8000", None)?);
//!     let store = Arc::new(RecordStore::new(&config.data_dir));
//!     let harvester = Harvester::new(stream, store, config);
//!
//!     let mut checkpoint = CheckpointStore::load("./data/checkpoint.json");
//!     let channel = ChannelId::new("rustlang")?;
//!     checkpoint.add_channel(channel.clone());
//!     harvester.crawl_channel(&mut checkpoint, &channel, &NoProgress).await?;
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod crawl;
pub mod http;
pub mod media;
pub mod poll;
pub mod reconcile;
pub mod store;
pub mod stream;

// Re-export the engine surface
pub use checkpoint::{CheckpointState, CheckpointStore};
pub use config::EngineConfig;
pub use crawl::{CrawlError, CrawlReport, Harvester, NoProgress, ProgressObserver};
pub use http::HttpFeedStream;
pub use media::{FetchError, MediaFetcher};
pub use poll::{PollSummary, Poller};
pub use reconcile::ReconcileReport;
pub use store::{MessageRecord, RecordStore, StoreError};
pub use stream::{
    MediaDescriptor, MediaFetchTask, MediaKind, MessageStream, Sender, StreamError, StreamItem,
};
