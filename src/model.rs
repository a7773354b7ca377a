//! Data model for scraped image posts.
//!
//! An [Image] is built per feed entry by the extractor and consumed right away by the
//! deduplicator and downloader; nothing here is persisted.

use serde::Serialize;

/// The Reddit user who submitted a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub name: String,
    /// Profile page, e.g. `https://www.reddit.com/user/name/`.
    #[serde(rename = "profileLink")]
    pub profile_link: String,
}

/// One scraped image post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    /// Post id assigned by the feed.
    #[serde(rename = "postId")]
    pub post_id: String,
    /// Final path segment of `link` without its extension. Empty means not downloadable.
    #[serde(rename = "imageId")]
    pub image_id: String,
    pub author: Author,
    #[serde(rename = "postLink")]
    pub post_link: String,
    /// Canonical link to the asset (gifv already rewritten to mp4).
    pub link: String,
    pub title: String,
    pub subreddit: String,
    /// Category term; only the RSS feed carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Image {
    /// An image with an empty id cannot be named on disk, so it is never downloaded.
    pub fn is_downloadable(&self) -> bool {
        !self.image_id.trim().is_empty()
    }
}
