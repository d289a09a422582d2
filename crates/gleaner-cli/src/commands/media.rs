//! Media capture toggle and reconciliation commands

use anyhow::Result;
use gleaner_common::{ChannelId, GleanerError};
use gleaner_engine::{CheckpointStore, Harvester};

/// Toggle media capture for subsequent crawls.
pub fn set_enabled(checkpoint: &mut CheckpointStore, enabled: bool) -> Result<()> {
    checkpoint.set_media_enabled(enabled);
    println!(
        "Media capture {}.",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Re-attempt missing media downloads for one or all tracked channels.
pub async fn reconcile(
    harvester: &Harvester,
    checkpoint: &CheckpointStore,
    only: Option<&str>,
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
        match harvester.reconcile_channel(&channel).await {
            Ok(report) if report.targeted == 0 => {
                println!("{}: no missing media.", channel);
            },
            Ok(report) => {
                println!(
                    "{}: {} targeted, {} recovered, {} still missing.",
                    channel, report.targeted, report.recovered, report.still_missing
                );
            },
            Err(e) => {
                eprintln!("{}: reconciliation failed: {}", channel, e);
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_toggle_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");

        let mut checkpoint = CheckpointStore::load(&path);
        set_enabled(&mut checkpoint, false).unwrap();

        let reloaded = CheckpointStore::load(&path);
        assert!(!reloaded.media_enabled());
    }
}
