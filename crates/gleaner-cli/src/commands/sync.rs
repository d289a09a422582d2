//! One-shot and continuous crawling commands

use anyhow::Result;
use gleaner_common::{ChannelId, GleanerError};
use gleaner_engine::{CheckpointStore, Harvester, Poller};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::progress::CrawlProgress;

/// Crawl the given channel, or every tracked channel, once.
///
/// A failing channel is reported and the remaining channels still run; the
/// failed one simply catches up on the next invocation.
pub async fn sync(
    harvester: &Harvester,
    checkpoint: &mut CheckpointStore,
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
        println!("No channels tracked. Add one with 'gleaner channel add <id>'.");
        return Ok(());
    }

    let mut failed = 0usize;
    for channel in channels {
        let progress = CrawlProgress::new(&channel);
        match harvester.crawl_channel(checkpoint, &channel, &progress).await {
            Ok(report) => {
                progress.finish();
                if report.processed == 0 {
                    println!("{}: up to date (cursor {}).", channel, report.cursor);
                } else {
                    println!(
                        "{}: {} messages ingested, {}/{} media fetched, cursor {}.",
                        channel,
                        report.processed,
                        report.media_fetched,
                        report.media_submitted,
                        report.cursor
                    );
                }
                if report.media_missing > 0 {
                    println!(
                        "{}: {} media downloads failed; run 'gleaner reconcile' to retry.",
                        channel, report.media_missing
                    );
                }
            },
            Err(e) => {
                progress.finish();
                failed += 1;
                eprintln!("{}: pass failed: {}", channel, e);
            },
        }
    }

    if failed > 0 {
        eprintln!("{} channel pass(es) failed; they will catch up on the next run.", failed);
    }
    Ok(())
}

/// Poll every tracked channel on the configured cadence until Ctrl-C.
pub async fn watch(harvester: &Harvester, checkpoint: &mut CheckpointStore) -> Result<()> {
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current channel");
            signal_token.cancel();
        }
    });

    println!(
        "Continuous harvesting started (cycle {}s). Press Ctrl-C to stop.",
        harvester.config().poll_interval.as_secs()
    );

    let summary = Poller::new(harvester).run(checkpoint, token).await;
    println!(
        "Stopped after {} round(s): {} passes completed, {} failed.",
        summary.rounds, summary.passes_ok, summary.passes_failed
    );
    Ok(())
}
