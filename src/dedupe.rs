//! Per-run record of image ids already handled, keyed by subreddit.

use std::collections::{HashMap, HashSet};

/// Tracks which image ids have been seen for each subreddit during one run.
///
/// Nothing is persisted; across runs the file on disk is the duplicate guard.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashMap<String, HashSet<String>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// False when `image_id` is blank or already recorded for `subreddit`.
    pub fn should_download(&self, subreddit: &str, image_id: &str) -> bool {
        if image_id.trim().is_empty() {
            return false;
        }
        !self
            .seen
            .get(subreddit)
            .is_some_and(|ids| ids.contains(image_id))
    }

    /// Record `image_id` for `subreddit`. Recording twice is a no-op.
    pub fn mark_downloaded(&mut self, subreddit: &str, image_id: &str) {
        if image_id.trim().is_empty() {
            return;
        }
        self.seen
            .entry(subreddit.to_string())
            .or_default()
            .insert(image_id.to_string());
    }

    /// Number of ids recorded for `subreddit`.
    pub fn seen_count(&self, subreddit: &str) -> usize {
        self.seen.get(subreddit).map_or(0, HashSet::len)
    }
}
