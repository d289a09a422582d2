//! Checkpoint persistence
//!
//! The checkpoint file is the sole source of truth for "where to resume": a
//! hand-editable JSON map of channel -> last processed item id, plus global
//! flags. Loads are lenient (a missing or corrupt file yields defaults), saves
//! are best-effort (a write failure is logged, the in-memory state stays
//! authoritative for the current run), and cursor advances are monotonic.

use gleaner_common::ChannelId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persisted resume state for all channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Last fully processed item id per channel (0 = from the beginning).
    #[serde(default)]
    pub channels: BTreeMap<ChannelId, i64>,

    /// Whether media referenced by ingested messages should be downloaded.
    #[serde(default = "default_media_enabled")]
    pub media_enabled: bool,
}

fn default_media_enabled() -> bool {
    true
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self {
            channels: BTreeMap::new(),
            media_enabled: true,
        }
    }
}

/// Durable store for [`CheckpointState`].
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: CheckpointState,
}

impl CheckpointStore {
    /// Load the checkpoint file, falling back to an empty default state.
    ///
    /// A corrupt file is renamed to `<name>.corrupt` before being replaced,
    /// so a hand-editing mistake can be recovered rather than silently lost.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(state) => state,
                Err(e) => {
                    let sidecar = path.with_extension("json.corrupt");
                    warn!(
                        path = %path.display(),
                        sidecar = %sidecar.display(),
                        error = %e,
                        "Checkpoint file is corrupt, starting from defaults"
                    );
                    if let Err(e) = std::fs::rename(&path, &sidecar) {
                        warn!(error = %e, "Failed to preserve corrupt checkpoint file");
                    }
                    CheckpointState::default()
                },
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No checkpoint file, starting from defaults");
                CheckpointState::default()
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read checkpoint file, starting from defaults");
                CheckpointState::default()
            },
        };

        Self { path, state }
    }

    /// Create a store around an existing state (tests, migrations).
    pub fn with_state(path: impl Into<PathBuf>, state: CheckpointState) -> Self {
        Self {
            path: path.into(),
            state,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    /// Channels currently known to the checkpoint, in stable order.
    pub fn channels(&self) -> Vec<ChannelId> {
        self.state.channels.keys().cloned().collect()
    }

    /// Cursor for a channel; 0 when the channel has never been crawled.
    pub fn cursor(&self, channel: &ChannelId) -> i64 {
        self.state.channels.get(channel).copied().unwrap_or(0)
    }

    pub fn contains(&self, channel: &ChannelId) -> bool {
        self.state.channels.contains_key(channel)
    }

    pub fn media_enabled(&self) -> bool {
        self.state.media_enabled
    }

    /// Toggle media capture; persisted immediately.
    pub fn set_media_enabled(&mut self, enabled: bool) {
        self.state.media_enabled = enabled;
        self.save();
    }

    /// Start tracking a channel at cursor 0. Returns false if already tracked.
    pub fn add_channel(&mut self, channel: ChannelId) -> bool {
        if self.state.channels.contains_key(&channel) {
            return false;
        }
        self.state.channels.insert(channel, 0);
        self.save();
        true
    }

    /// Stop tracking a channel. Stored records are left untouched.
    pub fn remove_channel(&mut self, channel: &ChannelId) -> bool {
        let removed = self.state.channels.remove(channel).is_some();
        if removed {
            self.save();
        }
        removed
    }

    /// Advance a channel's cursor, persisting the new state.
    ///
    /// The cursor is monotonic: an attempt to move it backwards is ignored
    /// (callers are expected to only advance, but the store defends against
    /// regression).
    pub fn advance(&mut self, channel: &ChannelId, cursor: i64) {
        let entry = self.state.channels.entry(channel.clone()).or_insert(0);
        if cursor < *entry {
            warn!(
                channel = %channel,
                stored = *entry,
                attempted = cursor,
                "Ignoring checkpoint regression"
            );
            return;
        }
        if cursor == *entry {
            return;
        }
        *entry = cursor;
        self.save();
    }

    /// Persist the current state. Best-effort: failures are logged, never
    /// raised, since the in-memory state remains authoritative for this run.
    pub fn save(&self) {
        if let Err(e) = self.save_inner() {
            warn!(path = %self.path.display(), error = %e, "Failed to save checkpoint");
        }
    }

    fn save_inner(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // Write to a sibling temp file and rename so a crash mid-write never
        // truncates the live checkpoint.
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(&self.state)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
