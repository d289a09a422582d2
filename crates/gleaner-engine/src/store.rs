//! Per-channel record store
//!
//! Each channel owns its own SQLite database under
//! `<data_dir>/<channel>/<channel>.db`, with downloaded media next to it in
//! `media/`. Pools are opened on first use through an explicit registry and
//! closed together on shutdown; nothing else in the process holds a database
//! handle.
//!
//! Inserts are idempotent (`INSERT OR IGNORE` keyed on the per-channel unique
//! `message_id`), so replaying a window after a crash never duplicates or
//! overwrites rows. The only field written after the fact is `media_path`,
//! set once when a download resolves.

use chrono::{DateTime, Utc};
use gleaner_common::ChannelId;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::stream::{MediaKind, StreamItem};

/// Storage failure. Record store failures always propagate: silently losing a
/// batch insert would break the durability contract downstream consumers
/// depend on.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One ingested message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    pub message_id: i64,
    pub timestamp: DateTime<Utc>,
    pub sender_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub body: String,
    pub media_kind: Option<MediaKind>,
    pub media_path: Option<String>,
    pub reply_to: Option<i64>,
}

impl MessageRecord {
    /// Map a stream item to its stored form. `media_path` starts empty and is
    /// reconciled after the download resolves.
    pub fn from_item(item: &StreamItem) -> Self {
        Self {
            message_id: item.id,
            timestamp: item.timestamp,
            sender_id: item.sender.id,
            first_name: item.sender.first_name.clone(),
            last_name: item.sender.last_name.clone(),
            username: item.sender.username.clone(),
            body: item.body.clone(),
            media_kind: item.media.as_ref().map(|m| m.kind),
            media_path: None,
            reply_to: item.reply_to,
        }
    }
}

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY,
    message_id INTEGER NOT NULL UNIQUE,
    timestamp TEXT NOT NULL,
    sender_id INTEGER NOT NULL,
    first_name TEXT,
    last_name TEXT,
    username TEXT,
    body TEXT NOT NULL,
    media_kind TEXT,
    media_path TEXT,
    reply_to INTEGER
)";

const CREATE_IDX_MESSAGE_ID: &str =
    "CREATE INDEX IF NOT EXISTS idx_messages_message_id ON messages(message_id)";

const CREATE_IDX_TIMESTAMP: &str =
    "CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp)";

const INSERT_MESSAGE: &str = "INSERT OR IGNORE INTO messages
    (message_id, timestamp, sender_id, first_name, last_name, username, body, media_kind, media_path, reply_to)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

const SELECT_COLUMNS: &str = "SELECT message_id, timestamp, sender_id, first_name, last_name,
    username, body, media_kind, media_path, reply_to FROM messages";

/// Registry of per-channel SQLite pools, opened lazily.
pub struct RecordStore {
    root: PathBuf,
    pools: Mutex<HashMap<ChannelId, SqlitePool>>,
}

impl RecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding this channel's database and media.
    pub fn channel_dir(&self, channel: &ChannelId) -> PathBuf {
        self.root.join(channel.as_str())
    }

    /// Directory downloaded media lands in for this channel.
    pub fn media_dir(&self, channel: &ChannelId) -> PathBuf {
        self.channel_dir(channel).join("media")
    }

    fn db_path(&self, channel: &ChannelId) -> PathBuf {
        self.channel_dir(channel)
            .join(format!("{}.db", channel.as_str()))
    }

    /// Whether a partition has ever been created for this channel.
    ///
    /// Read paths that should not create an empty database (status displays)
    /// check this first; every other accessor opens on first use.
    pub fn has_partition(&self, channel: &ChannelId) -> bool {
        self.db_path(channel).exists()
    }

    /// Get (or open) the pool for a channel's partition.
    async fn pool(&self, channel: &ChannelId) -> Result<SqlitePool, StoreError> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(channel) {
            return Ok(pool.clone());
        }

        let dir = self.channel_dir(channel);
        std::fs::create_dir_all(&dir)?;

        let options = SqliteConnectOptions::new()
            .filename(self.db_path(channel))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_IDX_MESSAGE_ID).execute(&pool).await?;
        sqlx::query(CREATE_IDX_TIMESTAMP).execute(&pool).await?;

        debug!(channel = %channel, path = %self.db_path(channel).display(), "Opened channel partition");
        pools.insert(channel.clone(), pool.clone());
        Ok(pool)
    }

    /// Idempotent bulk insert in a single transaction.
    ///
    /// Duplicate `message_id`s are silently ignored; returns the number of
    /// rows actually inserted.
    pub async fn insert_batch(
        &self,
        channel: &ChannelId,
        records: &[MessageRecord],
    ) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let pool = self.pool(channel).await?;
        let mut tx = pool.begin().await?;
        let mut inserted = 0u64;

        for record in records {
            let result = sqlx::query(INSERT_MESSAGE)
                .bind(record.message_id)
                .bind(record.timestamp)
                .bind(record.sender_id)
                .bind(&record.first_name)
                .bind(&record.last_name)
                .bind(&record.username)
                .bind(&record.body)
                .bind(record.media_kind.map(|k| k.as_str()))
                .bind(&record.media_path)
                .bind(record.reply_to)
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Record the path of a resolved media download.
    ///
    /// A no-op when the message is absent or already has a path recorded, so
    /// a reconciliation pass can never clobber an earlier result. Returns
    /// whether a row was updated.
    pub async fn update_media_path(
        &self,
        channel: &ChannelId,
        message_id: i64,
        path: &str,
    ) -> Result<bool, StoreError> {
        let pool = self.pool(channel).await?;
        let result =
            sqlx::query("UPDATE messages SET media_path = ?1 WHERE message_id = ?2 AND media_path IS NULL")
                .bind(path)
                .bind(message_id)
                .execute(&pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// One page of records ordered by timestamp (message id as tiebreak).
    ///
    /// Restartable paged retrieval for export consumers.
    pub async fn scan_page(
        &self,
        channel: &ChannelId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let pool = self.pool(channel).await?;
        let rows = sqlx::query(&format!(
            "{} ORDER BY timestamp, message_id LIMIT ?1 OFFSET ?2",
            SELECT_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Fetch a single record by message id.
    pub async fn get(
        &self,
        channel: &ChannelId,
        message_id: i64,
    ) -> Result<Option<MessageRecord>, StoreError> {
        let pool = self.pool(channel).await?;
        let row = sqlx::query(&format!("{} WHERE message_id = ?1", SELECT_COLUMNS))
            .bind(message_id)
            .fetch_optional(&pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Total records stored for a channel.
    pub async fn count(&self, channel: &ChannelId) -> Result<i64, StoreError> {
        let pool = self.pool(channel).await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&pool)
            .await?;
        Ok(count)
    }

    /// Records with downloadable media whose download never resolved.
    pub async fn count_missing_media(&self, channel: &ChannelId) -> Result<i64, StoreError> {
        let pool = self.pool(channel).await?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages
             WHERE media_kind IS NOT NULL AND media_kind != 'web_page' AND media_path IS NULL",
        )
        .fetch_one(&pool)
        .await?;
        Ok(count)
    }

    /// Ids (and kinds) of records with missing media, ascending by id.
    pub async fn list_missing_media(
        &self,
        channel: &ChannelId,
    ) -> Result<Vec<(i64, MediaKind)>, StoreError> {
        let pool = self.pool(channel).await?;
        let rows = sqlx::query(
            "SELECT message_id, media_kind FROM messages
             WHERE media_kind IS NOT NULL AND media_kind != 'web_page' AND media_path IS NULL
             ORDER BY message_id",
        )
        .fetch_all(&pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("message_id")?;
                let kind = parse_kind_column(row, "media_kind")?
                    .ok_or_else(|| sqlx::Error::Decode("media_kind unexpectedly NULL".into()))?;
                Ok((id, kind))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StoreError::from)
    }

    /// Close every open partition. Call once on shutdown.
    pub async fn close_all(&self) {
        let mut pools = self.pools.lock().await;
        for (channel, pool) in pools.drain() {
            pool.close().await;
            debug!(channel = %channel, "Closed channel partition");
        }
        info!("Record store shut down");
    }
}

fn parse_kind_column(row: &SqliteRow, column: &str) -> Result<Option<MediaKind>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| s.parse::<MediaKind>().map_err(|e| sqlx::Error::Decode(e.into())))
        .transpose()
}

fn record_from_row(row: &SqliteRow) -> Result<MessageRecord, StoreError> {
    Ok(MessageRecord {
        message_id: row.try_get("message_id").map_err(sqlx_err)?,
        timestamp: row.try_get("timestamp").map_err(sqlx_err)?,
        sender_id: row.try_get("sender_id").map_err(sqlx_err)?,
        first_name: row.try_get("first_name").map_err(sqlx_err)?,
        last_name: row.try_get("last_name").map_err(sqlx_err)?,
        username: row.try_get("username").map_err(sqlx_err)?,
        body: row.try_get("body").map_err(sqlx_err)?,
        media_kind: parse_kind_column(row, "media_kind").map_err(sqlx_err)?,
        media_path: row.try_get("media_path").map_err(sqlx_err)?,
        reply_to: row.try_get("reply_to").map_err(sqlx_err)?,
    })
}

fn sqlx_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e)
}
