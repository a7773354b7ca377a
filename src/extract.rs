//! Turn a feed page into image posts on the supported host.
//!
//! Non-image posts are filtered out silently. Entries that look like image posts but
//! lack an id, title, or author are reported in [Extraction::skipped] so one bad entry
//! never costs the rest of the page.

use crate::model::{Author, Image};
use crate::reddit::{EntryBody, FeedDocument, FeedEntry};
use regex::Regex;
use reqwest::Url;
use std::fmt;

/// Substring that identifies links on the supported image host.
pub const IMAGE_HOST_MARKER: &str = "imgur";

const HOST_PAGE_PATTERN: &str = r"https?://imgur\.com/[A-Za-z0-9\-]+";
const DIRECT_ASSET_PATTERN: &str = r"https?://i\.imgur\.com/[A-Za-z0-9\-]+(?:\.[A-Za-z0-9]+)?";

/// Why an entry that passed the host filter was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingField(&'static str),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingField(name) => write!(f, "entry has no {}", name),
        }
    }
}

/// An entry dropped during extraction, by 0-based position in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub position: usize,
    pub reason: SkipReason,
}

/// Result of extracting one page: images in feed order plus dropped entries.
#[derive(Debug, Default)]
pub struct Extraction {
    pub images: Vec<Image>,
    pub skipped: Vec<SkippedEntry>,
}

/// Rewrite `.gifv` links to `.mp4`; gifv needs a player-side decode step we don't do.
pub fn canonical_link(link: &str) -> String {
    if let Ok(mut url) = Url::parse(link) {
        if let Some(stem) = url.path().strip_suffix(".gifv") {
            let path = format!("{}.mp4", stem);
            url.set_path(&path);
            return url.to_string();
        }
        return link.to_string();
    }
    match link.strip_suffix("gifv") {
        Some(stem) => format!("{}mp4", stem),
        None => link.to_string(),
    }
}

/// Split the last path segment of `link` into (stem, extension).
///
/// Returns None when the URL does not parse, has no last segment, or the segment has no
/// extension (galleries, album pages, host pages).
pub fn split_last_segment(link: &str) -> Option<(String, String)> {
    let url = Url::parse(link).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some((stem.to_string(), ext.to_string()))
}

/// Image id for a link: final path segment without its extension, or empty.
pub fn image_id(link: &str) -> String {
    split_last_segment(link)
        .map(|(stem, _)| stem)
        .unwrap_or_default()
}

/// Extracts image posts from either feed dialect.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    host_page: Regex,
    direct_asset: Regex,
}

impl LinkExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            host_page: Regex::new(HOST_PAGE_PATTERN)?,
            direct_asset: Regex::new(DIRECT_ASSET_PATTERN)?,
        })
    }

    pub fn extract(&self, doc: &FeedDocument) -> Extraction {
        let mut out = Extraction::default();
        for (position, entry) in doc.entries.iter().enumerate() {
            let link = match &entry.body {
                EntryBody::Link { domain, url } => match listing_link(domain, url) {
                    Some(link) => link,
                    None => continue,
                },
                EntryBody::Html(content) => {
                    if !content.contains(IMAGE_HOST_MARKER) {
                        continue;
                    }
                    self.html_link(content)
                }
                EntryBody::Missing => continue,
            };
            match build_image(entry, link) {
                Ok(image) => out.images.push(image),
                Err(reason) => out.skipped.push(SkippedEntry { position, reason }),
            }
        }
        out
    }

    /// First host-page link, else first direct-asset link, else empty.
    fn html_link(&self, content: &str) -> String {
        self.host_page
            .find(content)
            .or_else(|| self.direct_asset.find(content))
            .map(|m| canonical_link(m.as_str()))
            .unwrap_or_default()
    }
}

/// Canonical link for a listing entry on the image host with a file-like last segment.
fn listing_link(domain: &Option<String>, url: &Option<String>) -> Option<String> {
    if !domain.as_deref()?.contains(IMAGE_HOST_MARKER) {
        return None;
    }
    let url = url.as_deref()?;
    let host_matches = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.contains(IMAGE_HOST_MARKER)))
        .unwrap_or(false);
    if !host_matches {
        return None;
    }
    let link = canonical_link(url);
    if image_id(&link).is_empty() {
        return None;
    }
    Some(link)
}

fn build_image(entry: &FeedEntry, link: String) -> Result<Image, SkipReason> {
    let post_id = entry.id.clone().ok_or(SkipReason::MissingField("id"))?;
    let title = entry.title.clone().ok_or(SkipReason::MissingField("title"))?;
    let name = entry
        .author_name
        .clone()
        .ok_or(SkipReason::MissingField("author"))?;
    let profile_link = entry
        .author_link
        .clone()
        .unwrap_or_else(|| format!("https://www.reddit.com/user/{}/", name));
    Ok(Image {
        post_id,
        image_id: image_id(&link),
        author: Author { name, profile_link },
        post_link: entry.post_link.clone().unwrap_or_default(),
        link,
        title,
        subreddit: entry
            .subreddit
            .clone()
            .or_else(|| entry.category.clone())
            .unwrap_or_default(),
        category: entry.category.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reddit::FeedDialect;

    fn listing_entry(id: &str, domain: &str, url: &str) -> FeedEntry {
        FeedEntry {
            id: Some(id.to_string()),
            title: Some(format!("post {}", id)),
            author_name: Some("someone".to_string()),
            author_link: None,
            post_link: Some(format!("https://www.reddit.com/r/pics/comments/{}/", id)),
            subreddit: Some("pics".to_string()),
            category: None,
            body: EntryBody::Link {
                domain: Some(domain.to_string()),
                url: Some(url.to_string()),
            },
        }
    }

    fn html_entry(id: &str, content: &str) -> FeedEntry {
        FeedEntry {
            id: Some(id.to_string()),
            title: Some("t".to_string()),
            author_name: Some("someone".to_string()),
            author_link: Some("https://www.reddit.com/user/someone".to_string()),
            post_link: None,
            subreddit: None,
            category: Some("pics".to_string()),
            body: EntryBody::Html(content.to_string()),
        }
    }

    fn doc(dialect: FeedDialect, entries: Vec<FeedEntry>) -> FeedDocument {
        FeedDocument { dialect, entries }
    }

    fn extractor() -> LinkExtractor {
        LinkExtractor::new().expect("patterns compile")
    }

    #[test]
    fn gifv_is_rewritten_to_mp4() {
        let link = canonical_link("https://i.imgur.com/abc123.gifv");
        assert_eq!(link, "https://i.imgur.com/abc123.mp4");
        assert_eq!(image_id(&link), "abc123");
    }

    #[test]
    fn non_gifv_links_are_untouched() {
        assert_eq!(
            canonical_link("https://i.imgur.com/xyz789.png"),
            "https://i.imgur.com/xyz789.png"
        );
    }

    #[test]
    fn image_id_strips_only_the_trailing_extension() {
        assert_eq!(image_id("https://i.imgur.com/xyz789.png"), "xyz789");
        assert_eq!(image_id("https://i.imgur.com/a.b.jpg?x=1"), "a.b");
        let link = "https://i.imgur.com/xyz789.png";
        assert_eq!(image_id(link), image_id(link));
    }

    #[test]
    fn image_id_is_empty_without_extension() {
        assert_eq!(image_id("https://imgur.com/a/gallery"), "");
        assert_eq!(image_id("https://imgur.com/"), "");
        assert_eq!(image_id("not a url"), "");
        assert_eq!(image_id(""), "");
    }

    #[test]
    fn listing_keeps_only_imgur_files() {
        let d = doc(
            FeedDialect::Json,
            vec![
                listing_entry("1", "i.imgur.com", "https://i.imgur.com/one.jpg"),
                listing_entry("2", "i.redd.it", "https://i.redd.it/two.jpg"),
                listing_entry("3", "imgur.com", "https://imgur.com/a/album"),
                listing_entry("4", "imgur.com", "https://example.com/four.png"),
                listing_entry("5", "i.imgur.com", "https://i.imgur.com/five.gifv"),
            ],
        );
        let out = extractor().extract(&d);
        let ids: Vec<_> = out.images.iter().map(|i| i.image_id.as_str()).collect();
        assert_eq!(ids, vec!["one", "five"]);
        assert_eq!(out.images[1].link, "https://i.imgur.com/five.mp4");
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn listing_without_extension_never_yields_an_image() {
        let d = doc(
            FeedDialect::Json,
            vec![
                listing_entry("1", "imgur.com", "https://imgur.com/noext"),
                listing_entry("2", "imgur.com", "https://i.imgur.com/dir.v2/noext"),
            ],
        );
        let out = extractor().extract(&d);
        assert!(out.images.iter().all(|i| i.image_id.is_empty()));
        assert!(out.images.is_empty());
    }

    #[test]
    fn listing_image_fields() {
        let d = doc(
            FeedDialect::Json,
            vec![listing_entry("xy", "i.imgur.com", "https://i.imgur.com/xyz789.png")],
        );
        let out = extractor().extract(&d);
        let image = &out.images[0];
        assert_eq!(image.post_id, "xy");
        assert_eq!(image.subreddit, "pics");
        assert_eq!(image.author.name, "someone");
        assert_eq!(
            image.author.profile_link,
            "https://www.reddit.com/user/someone/"
        );
        assert_eq!(image.category, None);
    }

    #[test]
    fn malformed_entry_is_skipped_and_rest_kept() {
        let mut broken = listing_entry("2", "i.imgur.com", "https://i.imgur.com/two.png");
        broken.author_name = None;
        let d = doc(
            FeedDialect::Json,
            vec![
                listing_entry("1", "i.imgur.com", "https://i.imgur.com/one.png"),
                broken,
                listing_entry("3", "i.imgur.com", "https://i.imgur.com/three.png"),
            ],
        );
        let out = extractor().extract(&d);
        assert_eq!(out.images.len(), 2);
        assert_eq!(
            out.skipped,
            vec![SkippedEntry {
                position: 1,
                reason: SkipReason::MissingField("author"),
            }]
        );
    }

    #[test]
    fn html_prefers_host_page_link() {
        let content = r#"<a href="https://i.imgur.com/direct1.jpg">img</a> <a href="https://imgur.com/page22">page</a>"#;
        let d = doc(FeedDialect::Rss, vec![html_entry("1", content)]);
        let out = extractor().extract(&d);
        assert_eq!(out.images[0].link, "https://imgur.com/page22");
        assert_eq!(out.images[0].image_id, "");
        assert_eq!(out.images[0].category.as_deref(), Some("pics"));
        assert_eq!(out.images[0].subreddit, "pics");
    }

    #[test]
    fn html_falls_back_to_direct_link() {
        let content = r#"<a href="https://i.imgur.com/abc123.gifv">[link]</a>"#;
        let d = doc(FeedDialect::Rss, vec![html_entry("1", content)]);
        let out = extractor().extract(&d);
        assert_eq!(out.images[0].link, "https://i.imgur.com/abc123.mp4");
        assert_eq!(out.images[0].image_id, "abc123");
    }

    #[test]
    fn html_without_match_leaves_link_empty() {
        let content = "mentions imgur but links nowhere";
        let d = doc(
            FeedDialect::Rss,
            vec![html_entry("1", content), html_entry("2", "no host here")],
        );
        let out = extractor().extract(&d);
        assert_eq!(out.images.len(), 1);
        assert_eq!(out.images[0].link, "");
        assert!(!out.images[0].is_downloadable());
    }

    #[test]
    fn entries_without_body_are_ignored() {
        let d = doc(FeedDialect::Rss, vec![FeedEntry::default()]);
        let out = extractor().extract(&d);
        assert!(out.images.is_empty());
        assert!(out.skipped.is_empty());
    }
}
