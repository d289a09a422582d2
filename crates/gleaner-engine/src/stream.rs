//! Message stream adapter seam
//!
//! The engine consumes any remote messaging source through [`MessageStream`]:
//! a pending-item count, an ascending-id item stream, and a media fetch
//! capability. Implementations map their transport's rate-limit signal to
//! [`StreamError::RateLimited`] so the scheduler can honor the mandated wait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use gleaner_common::ChannelId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Kind of media attached to a message.
///
/// The set of kinds is closed; each variant is handled exhaustively. Web-page
/// previews are recorded but never downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Document,
    WebPage,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Document => "document",
            MediaKind::WebPage => "web_page",
        }
    }

    /// Whether this kind is eligible for download.
    pub fn downloadable(&self) -> bool {
        match self {
            MediaKind::Photo | MediaKind::Document => true,
            MediaKind::WebPage => false,
        }
    }

    /// Extension used when the source suggests no file name.
    pub fn fallback_extension(&self) -> &'static str {
        match self {
            MediaKind::Photo => "jpg",
            MediaKind::Document => "bin",
            MediaKind::WebPage => "html",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(MediaKind::Photo),
            "document" => Ok(MediaKind::Document),
            "web_page" => Ok(MediaKind::WebPage),
            other => Err(format!("unknown media kind '{}'", other)),
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Media attached to a stream item: its kind plus the file name the source
/// suggests, when it suggests one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    pub kind: MediaKind,
    pub file_name: Option<String>,
}

impl MediaDescriptor {
    /// Deterministic destination file name for this descriptor.
    ///
    /// Always prefixed with the message id so repeated fetches for the same
    /// message resolve to the same path regardless of when they run.
    pub fn destination_name(&self, message_id: i64) -> String {
        match &self.file_name {
            Some(name) => format!("{}_{}", message_id, sanitize_file_name(name)),
            None => format!("{}.{}", message_id, self.kind.fallback_extension()),
        }
    }
}

/// Strip path components and shell-hostile characters from a suggested name.
fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Sender of a stream item, already resolved to its display fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sender {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

/// One item yielded by the message stream, in increasing-id order.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamItem {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub sender: Sender,
    pub body: String,
    pub media: Option<MediaDescriptor>,
    pub reply_to: Option<i64>,
}

/// Errors surfaced by a message stream adapter.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The remote source mandated a cool-down before the next request.
    #[error("rate limited by remote source, retry after {}s", .wait.as_secs())]
    RateLimited { wait: Duration },

    /// The channel does not exist or cannot be accessed.
    #[error("channel '{0}' could not be resolved")]
    ChannelUnavailable(String),

    /// Generic transport failure (connection, protocol, decode).
    #[error("transport failure: {0}")]
    Transport(String),

    /// A single item could not be converted; the stream continues past it.
    #[error("malformed item {id}: {reason}")]
    MalformedItem { id: i64, reason: String },
}

impl StreamError {
    /// Whether this error aborts the whole channel pass.
    ///
    /// Malformed items are skipped; everything else means the stream itself
    /// is unusable for this pass.
    pub fn aborts_pass(&self) -> bool {
        !matches!(self, StreamError::MalformedItem { .. })
    }
}

/// Ordered item stream for one channel pass.
pub type ItemStream<'a> = BoxStream<'a, Result<StreamItem, StreamError>>;

/// Abstract remote messaging source.
///
/// Implementations must yield items strictly greater than `after` in
/// increasing id order, and must report the rate-limit condition distinctly
/// from generic transport failures.
#[async_trait]
pub trait MessageStream: Send + Sync {
    /// Count of items strictly after the given offset.
    async fn pending_count(&self, channel: &ChannelId, after: i64) -> Result<u64, StreamError>;

    /// Items strictly after the given offset, oldest first.
    async fn items(&self, channel: &ChannelId, after: i64) -> Result<ItemStream<'_>, StreamError>;

    /// Fetch the media bytes for a message into `dest`.
    ///
    /// `dest` must only exist once the content is complete; implementations
    /// write to a sibling temp file and rename into place.
    async fn fetch_media(
        &self,
        channel: &ChannelId,
        message_id: i64,
        dest: &Path,
    ) -> Result<(), StreamError>;
}

/// Ephemeral unit of media work handed to the fetch scheduler.
#[derive(Debug, Clone)]
pub struct MediaFetchTask {
    pub channel: ChannelId,
    pub message_id: i64,
    pub descriptor: MediaDescriptor,
    pub media_dir: PathBuf,
}
