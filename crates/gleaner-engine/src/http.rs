//! HTTP feed adapter
//!
//! [`MessageStream`] implementation over a JSON feed API:
//!
//! - `GET /channels/{id}/messages/count?after=N` -> `{"count": n}`
//! - `GET /channels/{id}/messages?after=N&limit=P` -> array of items,
//!   ascending by id; a short page ends the stream
//! - `GET /channels/{id}/messages/{mid}/media` -> raw bytes
//!
//! HTTP 429 with a `Retry-After` header maps to the distinct rate-limit
//! condition; 404 on a channel maps to channel-unavailable. The adapter
//! itself never retries - retry policy belongs to the media scheduler and the
//! polling cadence.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use gleaner_common::{ChannelId, GleanerError};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::stream::{
    ItemStream, MediaDescriptor, MessageStream, Sender, StreamError, StreamItem,
};

/// Items requested per page.
const DEFAULT_PAGE_SIZE: i64 = 200;

/// Wait applied when the server rate-limits without a Retry-After header.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

/// Per-request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for a JSON message feed.
#[derive(Clone)]
pub struct HttpFeedStream {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    page_size: i64,
}

impl HttpFeedStream {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> gleaner_common::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| GleanerError::feed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Override the page size (mainly for tests).
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size;
        self
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.get(url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Map a non-success response to the adapter error taxonomy.
    fn error_for_response(channel: &ChannelId, response: &reqwest::Response) -> Option<StreamError> {
        let status = response.status();
        if status.is_success() {
            return None;
        }
        Some(match status {
            reqwest::StatusCode::TOO_MANY_REQUESTS => {
                let wait = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
                StreamError::RateLimited { wait }
            },
            reqwest::StatusCode::NOT_FOUND => {
                StreamError::ChannelUnavailable(channel.to_string())
            },
            status => StreamError::Transport(format!("unexpected status {}", status)),
        })
    }

    async fn get_checked(
        &self,
        channel: &ChannelId,
        url: &str,
    ) -> Result<reqwest::Response, StreamError> {
        let response = self
            .request(url)
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        if let Some(err) = Self::error_for_response(channel, &response) {
            return Err(err);
        }
        Ok(response)
    }

    /// Fetch one page of raw items strictly after `cursor`.
    async fn fetch_page(
        &self,
        channel: &ChannelId,
        cursor: i64,
    ) -> Result<Vec<serde_json::Value>, StreamError> {
        let url = format!(
            "{}/channels/{}/messages?after={}&limit={}",
            self.base_url, channel, cursor, self.page_size
        );
        debug!(channel = %channel, after = cursor, "Fetching feed page");
        let response = self.get_checked(channel, &url).await?;
        response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| StreamError::Transport(format!("invalid page body: {}", e)))
    }
}

#[async_trait::async_trait]
impl MessageStream for HttpFeedStream {
    async fn pending_count(&self, channel: &ChannelId, after: i64) -> Result<u64, StreamError> {
        let url = format!(
            "{}/channels/{}/messages/count?after={}",
            self.base_url, channel, after
        );
        let response = self.get_checked(channel, &url).await?;
        let body: WireCount = response
            .json()
            .await
            .map_err(|e| StreamError::Transport(format!("invalid count body: {}", e)))?;
        Ok(body.count)
    }

    async fn items(&self, channel: &ChannelId, after: i64) -> Result<ItemStream<'_>, StreamError> {
        struct PageState {
            adapter: HttpFeedStream,
            channel: ChannelId,
            cursor: i64,
            buf: VecDeque<Result<StreamItem, StreamError>>,
            done: bool,
        }

        let state = PageState {
            adapter: self.clone(),
            channel: channel.clone(),
            cursor: after,
            buf: VecDeque::new(),
            done: false,
        };

        let stream = futures::stream::unfold(state, |mut s| async move {
            loop {
                if let Some(next) = s.buf.pop_front() {
                    if matches!(&next, Err(e) if e.aborts_pass()) {
                        s.done = true;
                        s.buf.clear();
                    }
                    return Some((next, s));
                }
                if s.done {
                    return None;
                }

                match s.adapter.fetch_page(&s.channel, s.cursor).await {
                    Ok(page) => {
                        if (page.len() as i64) < s.adapter.page_size {
                            s.done = true;
                        }
                        let before = s.cursor;
                        for raw in page {
                            // Advance on the raw id even when the element is
                            // malformed, so one bad page cannot be refetched
                            // forever.
                            if let Some(id) = raw.get("id").and_then(serde_json::Value::as_i64) {
                                s.cursor = s.cursor.max(id);
                            }
                            s.buf.push_back(convert_item(raw));
                        }
                        if !s.done && s.cursor == before {
                            debug!(channel = %s.channel, cursor = before, "Feed page made no progress, ending stream");
                            s.done = true;
                        }
                    },
                    Err(e) => {
                        s.done = true;
                        return Some((Err(e), s));
                    },
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn fetch_media(
        &self,
        channel: &ChannelId,
        message_id: i64,
        dest: &Path,
    ) -> Result<(), StreamError> {
        let url = format!(
            "{}/channels/{}/messages/{}/media",
            self.base_url, channel, message_id
        );
        let response = self.get_checked(channel, &url).await?;

        // Stream into a sibling temp file; the final path only ever holds
        // complete content, which keeps the existing-file short-circuit safe.
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| message_id.to_string());
        let tmp = dest.with_file_name(format!("{}.part", file_name));

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| StreamError::Transport(format!("create {}: {}", tmp.display(), e)))?;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StreamError::Transport(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| StreamError::Transport(e.to_string()))?;
        }
        file.flush()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        drop(file);

        tokio::fs::rename(&tmp, dest)
            .await
            .map_err(|e| StreamError::Transport(format!("rename into place: {}", e)))?;
        Ok(())
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireCount {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct WireSender {
    id: i64,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMedia {
    kind: String,
    #[serde(default)]
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    id: i64,
    timestamp: DateTime<Utc>,
    sender: WireSender,
    #[serde(default)]
    body: String,
    #[serde(default)]
    media: Option<WireMedia>,
    #[serde(default)]
    reply_to: Option<i64>,
}

/// Decode one raw feed element. Decode failures degrade to a malformed-item
/// error so a single bad element cannot poison the whole page.
fn convert_item(raw: serde_json::Value) -> Result<StreamItem, StreamError> {
    let id = raw.get("id").and_then(serde_json::Value::as_i64).unwrap_or(0);
    let wire: WireItem = serde_json::from_value(raw).map_err(|e| StreamError::MalformedItem {
        id,
        reason: e.to_string(),
    })?;

    let media = match wire.media {
        Some(m) => Some(MediaDescriptor {
            kind: m
                .kind
                .parse()
                .map_err(|reason| StreamError::MalformedItem { id, reason })?,
            file_name: m.file_name,
        }),
        None => None,
    };

    Ok(StreamItem {
        id: wire.id,
        timestamp: wire.timestamp,
        sender: Sender {
            id: wire.sender.id,
            first_name: wire.sender.first_name,
            last_name: wire.sender.last_name,
            username: wire.sender.username,
        },
        body: wire.body,
        media,
        reply_to: wire.reply_to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(id: &str) -> ChannelId {
        ChannelId::new(id).unwrap()
    }

    fn wire_item(id: i64) -> serde_json::Value {
        json!({
            "id": id,
            "timestamp": "2026-03-01T10:00:00Z",
            "sender": {"id": 7, "username": "ada"},
            "body": format!("m{}", id)
        })
    }

    #[tokio::test]
    async fn test_pending_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/alpha/messages/count"))
            .and(query_param("after", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 12})))
            .mount(&server)
            .await;

        let adapter = HttpFeedStream::new(server.uri(), None).unwrap();
        assert_eq!(adapter.pending_count(&channel("alpha"), 5).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_unknown_channel_maps_to_channel_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/ghost/messages/count"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let adapter = HttpFeedStream::new(server.uri(), None).unwrap();
        let err = adapter.pending_count(&channel("ghost"), 0).await.unwrap_err();
        assert!(matches!(err, StreamError::ChannelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/alpha/messages/count"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let adapter = HttpFeedStream::new(server.uri(), None).unwrap();
        let err = adapter.pending_count(&channel("alpha"), 0).await.unwrap_err();
        match err {
            StreamError::RateLimited { wait } => assert_eq!(wait, Duration::from_secs(7)),
            other => panic!("expected rate limit, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_items_pages_until_short_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/alpha/messages"))
            .and(query_param("after", "0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([wire_item(1), wire_item(2)])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/channels/alpha/messages"))
            .and(query_param("after", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([wire_item(3)])))
            .mount(&server)
            .await;

        let adapter = HttpFeedStream::new(server.uri(), None)
            .unwrap()
            .with_page_size(2);
        let mut items = adapter.items(&channel("alpha"), 0).await.unwrap();

        let mut seen = Vec::new();
        while let Some(next) = items.next().await {
            seen.push(next.unwrap().id);
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_malformed_element_degrades_to_item_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/alpha/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                wire_item(1),
                {"id": 2, "timestamp": "not a date", "sender": {"id": 1}},
                wire_item(3),
            ])))
            .mount(&server)
            .await;

        let adapter = HttpFeedStream::new(server.uri(), None).unwrap();
        let mut items = adapter.items(&channel("alpha"), 0).await.unwrap();

        assert_eq!(items.next().await.unwrap().unwrap().id, 1);
        let malformed = items.next().await.unwrap().unwrap_err();
        assert!(matches!(malformed, StreamError::MalformedItem { id: 2, .. }));
        assert_eq!(items.next().await.unwrap().unwrap().id, 3);
        assert!(items.next().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_media_kind_is_malformed() {
        let server = MockServer::start().await;
        let mut bad = wire_item(4);
        bad["media"] = json!({"kind": "sticker"});
        Mock::given(method("GET"))
            .and(path("/channels/alpha/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([bad])))
            .mount(&server)
            .await;

        let adapter = HttpFeedStream::new(server.uri(), None).unwrap();
        let mut items = adapter.items(&channel("alpha"), 0).await.unwrap();
        let err = items.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::MalformedItem { id: 4, .. }));
    }

    #[tokio::test]
    async fn test_fetch_media_writes_complete_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/alpha/messages/9/media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("9.jpg");
        let adapter = HttpFeedStream::new(server.uri(), None).unwrap();
        adapter
            .fetch_media(&channel("alpha"), 9, &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"jpeg bytes");
        assert!(!dir.path().join("9.jpg.part").exists());
    }

    #[tokio::test]
    async fn test_bearer_token_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/alpha/messages/count"))
            .and(header("authorization", "Bearer sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0})))
            .mount(&server)
            .await;

        let adapter = HttpFeedStream::new(server.uri(), Some("sekrit".to_string())).unwrap();
        assert_eq!(adapter.pending_count(&channel("alpha"), 0).await.unwrap(), 0);
    }
}
