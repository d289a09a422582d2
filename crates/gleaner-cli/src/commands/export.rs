//! Export stored records to CSV and JSON
//!
//! Thin consumers of the record store's paged ordered scans. The files land
//! next to the channel's database; the exact shapes are whatever `csv` and
//! `serde_json` produce from a record, not a contract.

use anyhow::{Context, Result};
use clap::ValueEnum;
use gleaner_common::{ChannelId, GleanerError};
use gleaner_engine::{CheckpointStore, RecordStore};
use std::io::Write;
use std::path::PathBuf;

/// Rows pulled per page while scanning a partition.
const EXPORT_PAGE: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
    Both,
}

/// Export one or all tracked channels.
pub async fn export(
    store: &RecordStore,
    checkpoint: &CheckpointStore,
    only: Option<&str>,
    format: ExportFormat,
) -> Result<()> {
    let channels = match only {
        Some(id) => {
            let channel = ChannelId::new(id)?;
            if !checkpoint.contains(&channel) {
                return Err(GleanerError::UnknownChannel(channel.to_string()).into());
            }
            vec![channel]
        },
        None => checkpoint.channels(),
    };

    if channels.is_empty() {
        println!("No channels tracked.");
        return Ok(());
    }

    for channel in channels {
        if matches!(format, ExportFormat::Csv | ExportFormat::Both) {
            let path = export_csv(store, &channel).await?;
            println!("{}: wrote {}", channel, path.display());
        }
        if matches!(format, ExportFormat::Json | ExportFormat::Both) {
            let path = export_json(store, &channel).await?;
            println!("{}: wrote {}", channel, path.display());
        }
    }
    Ok(())
}

/// Write `<channel>.csv` next to the channel's database.
pub async fn export_csv(store: &RecordStore, channel: &ChannelId) -> Result<PathBuf> {
    let dir = store.channel_dir(channel);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.csv", channel));

    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut offset = 0i64;
    loop {
        let page = store.scan_page(channel, offset, EXPORT_PAGE).await?;
        if page.is_empty() {
            break;
        }
        offset += page.len() as i64;
        for record in &page {
            writer
                .serialize(record)
                .context("Failed to serialize record to CSV")?;
        }
    }
    writer.flush().context("Failed to flush CSV writer")?;
    Ok(path)
}

/// Write `<channel>.json` (a streamed array) next to the channel's database.
pub async fn export_json(store: &RecordStore, channel: &ChannelId) -> Result<PathBuf> {
    let dir = store.channel_dir(channel);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.json", channel));

    let file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);
    out.write_all(b"[\n")?;

    let mut offset = 0i64;
    let mut first = true;
    loop {
        let page = store.scan_page(channel, offset, EXPORT_PAGE).await?;
        if page.is_empty() {
            break;
        }
        offset += page.len() as i64;
        for record in &page {
            if !first {
                out.write_all(b",\n")?;
            }
            first = false;
            serde_json::to_writer_pretty(&mut out, record)
                .context("Failed to serialize record to JSON")?;
        }
    }

    out.write_all(b"\n]\n")?;
    out.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gleaner_engine::{MediaKind, MessageRecord};
    use tempfile::TempDir;

    fn record(message_id: i64) -> MessageRecord {
        MessageRecord {
            message_id,
            timestamp: Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, message_id as u32 % 60).unwrap(),
            sender_id: 5,
            first_name: None,
            last_name: None,
            username: Some("ada".into()),
            body: format!("hello {}", message_id),
            media_kind: if message_id % 2 == 0 {
                Some(MediaKind::Photo)
            } else {
                None
            },
            media_path: None,
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn test_csv_export_round_trips_rows() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path());
        let channel = ChannelId::new("alpha").unwrap();

        let records: Vec<_> = (1..=5).map(record).collect();
        store.insert_batch(&channel, &records).await.unwrap();

        let path = export_csv(&store, &channel).await.unwrap();
        let body = std::fs::read_to_string(&path).unwrap();

        let mut reader = csv::Reader::from_reader(body.as_bytes());
        assert_eq!(reader.records().count(), 5);
        assert!(body.contains("hello 3"));
        assert!(body.contains("photo"));
    }

    #[tokio::test]
    async fn test_json_export_is_a_valid_array() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path());
        let channel = ChannelId::new("alpha").unwrap();

        let records: Vec<_> = (1..=3).map(record).collect();
        store.insert_batch(&channel, &records).await.unwrap();

        let path = export_json(&store, &channel).await.unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();

        let rows = parsed.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["message_id"], 1);
        assert_eq!(rows[1]["media_kind"], "photo");
    }

    #[tokio::test]
    async fn test_empty_channel_exports_empty_files() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path());
        let channel = ChannelId::new("alpha").unwrap();

        let path = export_json(&store, &channel).await.unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 0);
    }
}
