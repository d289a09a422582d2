//! Progress bar utilities for CLI operations
//!
//! Binds the engine's progress callbacks to indicatif bars so long crawls
//! report incrementally instead of going silent.

use gleaner_common::ChannelId;
use gleaner_engine::ProgressObserver;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Create a progress bar for counted operations
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
            .expect("Invalid progress bar template")
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Create a spinner for indeterminate operations
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Item and media progress for one crawl pass of one channel.
pub struct CrawlProgress {
    _multi: MultiProgress,
    items: ProgressBar,
    media: ProgressBar,
}

impl CrawlProgress {
    pub fn new(channel: &ChannelId) -> Self {
        let multi = MultiProgress::new();
        let items = multi.add(create_progress_bar(0, &format!("{} messages", channel)));
        let media = multi.add(create_progress_bar(0, &format!("{} media", channel)));
        Self {
            _multi: multi,
            items,
            media,
        }
    }

    pub fn finish(&self) {
        self.items.finish_and_clear();
        self.media.finish_and_clear();
    }
}

impl ProgressObserver for CrawlProgress {
    fn on_items(&self, processed: u64, total: u64) {
        self.items.set_length(total);
        self.items.set_position(processed);
    }

    fn on_media(&self, completed: u64, submitted: u64) {
        self.media.set_length(submitted);
        self.media.set_position(completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_tracks_positions() {
        let progress = CrawlProgress::new(&ChannelId::new("alpha").unwrap());
        progress.on_items(3, 10);
        progress.on_media(1, 2);

        assert_eq!(progress.items.position(), 3);
        assert_eq!(progress.items.length(), Some(10));
        assert_eq!(progress.media.position(), 1);
        progress.finish();
    }
}
