//! Channel management commands

use anyhow::Result;
use gleaner_common::ChannelId;
use gleaner_engine::CheckpointStore;

/// Track a new channel starting from the beginning of its history.
pub fn add(checkpoint: &mut CheckpointStore, id: &str) -> Result<()> {
    let channel = ChannelId::new(id)?;
    if checkpoint.add_channel(channel.clone()) {
        println!("Added channel {}.", channel);
    } else {
        println!(
            "Channel {} is already tracked (cursor {}).",
            channel,
            checkpoint.cursor(&channel)
        );
    }
    Ok(())
}

/// Stop tracking a channel. Its stored records stay on disk.
pub fn remove(checkpoint: &mut CheckpointStore, id: &str) -> Result<()> {
    let channel = ChannelId::new(id)?;
    if checkpoint.remove_channel(&channel) {
        println!("Removed channel {}. Stored records were kept.", channel);
    } else {
        println!("Channel {} is not tracked.", channel);
    }
    Ok(())
}

/// List tracked channels and their cursors.
pub fn list(checkpoint: &CheckpointStore) -> Result<()> {
    let channels = checkpoint.channels();
    if channels.is_empty() {
        println!("No channels tracked. Add one with 'gleaner channel add <id>'.");
        return Ok(());
    }

    println!("Tracked channels:");
    for channel in channels {
        println!("  {}  cursor={}", channel, checkpoint.cursor(&channel));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_add_then_remove() {
        let dir = TempDir::new().unwrap();
        let mut checkpoint = CheckpointStore::load(dir.path().join("checkpoint.json"));

        add(&mut checkpoint, "alpha").unwrap();
        assert_eq!(checkpoint.channels().len(), 1);

        // Adding again must not reset anything.
        add(&mut checkpoint, "alpha").unwrap();
        assert_eq!(checkpoint.channels().len(), 1);

        remove(&mut checkpoint, "alpha").unwrap();
        assert!(checkpoint.channels().is_empty());
    }

    #[test]
    fn test_add_rejects_path_like_id() {
        let dir = TempDir::new().unwrap();
        let mut checkpoint = CheckpointStore::load(dir.path().join("checkpoint.json"));
        assert!(add(&mut checkpoint, "../evil").is_err());
    }
}
