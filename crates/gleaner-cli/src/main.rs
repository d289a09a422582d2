//! Gleaner - incremental message-stream harvester

use anyhow::Result;
use clap::{Parser, Subcommand};
use gleaner_cli::commands;
use gleaner_cli::commands::export::ExportFormat;
use gleaner_cli::Settings;
use gleaner_common::logging::{init_logging, LogConfig, LogLevel};
use gleaner_engine::{CheckpointStore, Harvester, HttpFeedStream, RecordStore};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gleaner")]
#[command(author, version, about = "Incremental message-stream harvester")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage tracked channels
    Channel {
        #[command(subcommand)]
        action: ChannelAction,
    },

    /// Crawl every tracked channel once (or a single channel)
    Sync {
        /// Channel to crawl; all tracked channels when omitted
        channel: Option<String>,
    },

    /// Continuously poll all tracked channels until Ctrl-C
    Watch,

    /// Toggle media capture for subsequent crawls
    Media {
        #[command(subcommand)]
        action: MediaAction,
    },

    /// Re-attempt missing media downloads
    Reconcile {
        /// Channel to reconcile; all tracked channels when omitted
        channel: Option<String>,
    },

    /// Export stored records
    Export {
        /// Channel to export; all tracked channels when omitted
        channel: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "both")]
        format: ExportFormat,
    },

    /// Show tracked channels, cursors, and storage counts
    Status,
}

#[derive(Subcommand, Debug)]
enum ChannelAction {
    /// Track a new channel from the beginning of its history
    Add { id: String },
    /// Stop tracking a channel (stored records are kept)
    Remove { id: String },
    /// List tracked channels
    List,
}

#[derive(Subcommand, Debug)]
enum MediaAction {
    /// Download media for newly ingested messages
    On,
    /// Ingest text only
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("gleaner".to_string())
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    let settings = Settings::from_env()?;
    let store = Arc::new(RecordStore::new(&settings.engine.data_dir));
    let stream = Arc::new(HttpFeedStream::new(
        settings.feed_url.clone(),
        settings.feed_token.clone(),
    )?);
    let harvester = Harvester::new(stream, store.clone(), settings.engine.clone());
    let mut checkpoint = CheckpointStore::load(settings.checkpoint_path());

    let outcome = run_command(cli.command, &harvester, &mut checkpoint, &store).await;

    // Explicit registry shutdown; partitions were opened lazily as commands
    // touched them.
    store.close_all().await;
    info!("Done");
    outcome
}

async fn run_command(
    command: Command,
    harvester: &Harvester,
    checkpoint: &mut CheckpointStore,
    store: &Arc<RecordStore>,
) -> Result<()> {
    match command {
        Command::Channel { action } => match action {
            ChannelAction::Add { id } => commands::channel::add(checkpoint, &id),
            ChannelAction::Remove { id } => commands::channel::remove(checkpoint, &id),
            ChannelAction::List => commands::channel::list(checkpoint),
        },
        Command::Sync { channel } => {
            commands::sync::sync(harvester, checkpoint, channel.as_deref()).await
        },
        Command::Watch => commands::sync::watch(harvester, checkpoint).await,
        Command::Media { action } => match action {
            MediaAction::On => commands::media::set_enabled(checkpoint, true),
            MediaAction::Off => commands::media::set_enabled(checkpoint, false),
        },
        Command::Reconcile { channel } => {
            commands::media::reconcile(harvester, checkpoint, channel.as_deref()).await
        },
        Command::Export { channel, format } => {
            commands::export::export(store, checkpoint, channel.as_deref(), format).await
        },
        Command::Status => commands::status::status(store, checkpoint).await,
    }
}
