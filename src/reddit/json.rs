//! JSON listing adapter (`/.json` endpoints).
//!
//! Children are read one by one from a `serde_json::Value` so a single odd child
//! cannot fail the whole page.

use super::{EntryBody, FeedEntry, ScrapeError, SITE_BASE};
use serde_json::Value;

pub(super) fn parse_listing(url: &str, body: &[u8]) -> Result<Vec<FeedEntry>, ScrapeError> {
    let root: Value = serde_json::from_slice(body).map_err(|e| ScrapeError::MalformedFeed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let data = root
        .get("data")
        .ok_or_else(|| ScrapeError::MalformedFeed {
            url: url.to_string(),
            reason: "listing has no data object".to_string(),
        })?;
    let children = match data.get("children").and_then(Value::as_array) {
        Some(children) => children,
        None => return Ok(Vec::new()),
    };
    Ok(children
        .iter()
        .map(|child| child.get("data").map(child_to_entry).unwrap_or_default())
        .collect())
}

fn child_to_entry(data: &Value) -> FeedEntry {
    let field = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    let author_name = field("author");
    let author_link = author_name
        .as_deref()
        .map(|name| format!("{}/user/{}/", SITE_BASE, name));
    let post_link = field("permalink").map(|p| {
        if p.starts_with('/') {
            format!("{}{}", SITE_BASE, p)
        } else {
            p
        }
    });
    FeedEntry {
        id: field("id"),
        title: field("title"),
        author_name,
        author_link,
        post_link,
        subreddit: field("subreddit"),
        category: None,
        body: EntryBody::Link {
            domain: field("domain"),
            url: field("url"),
        },
    }
}
