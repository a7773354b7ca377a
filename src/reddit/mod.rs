//! Reddit feed access: request URLs, page types, the canonical feed document, and its two adapters.

mod atom;
mod client;
mod error;
mod json;

pub use client::{HttpGet, PoliteClient, PoliteClientBuilder};
pub use error::ScrapeError;

const SITE_BASE: &str = "https://www.reddit.com";

/// Pseudo-subreddit that maps to the site-wide aggregate feed.
pub const FRONTPAGE: &str = "frontpage";

/// Reddit never returns more than this many posts per listing request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Which feed format to request and parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedDialect {
    Json,
    Rss,
}

impl FeedDialect {
    fn extension(self) -> &'static str {
        match self {
            FeedDialect::Json => "json",
            FeedDialect::Rss => "rss",
        }
    }
}

/// Time window for the `top` and `controversial` listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSpan {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeSpan {
    fn parse(s: &str) -> Option<TimeSpan> {
        match s {
            "hour" => Some(TimeSpan::Hour),
            "day" => Some(TimeSpan::Day),
            "week" => Some(TimeSpan::Week),
            "month" => Some(TimeSpan::Month),
            "year" => Some(TimeSpan::Year),
            "all" => Some(TimeSpan::All),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            TimeSpan::Hour => "hour",
            TimeSpan::Day => "day",
            TimeSpan::Week => "week",
            TimeSpan::Month => "month",
            TimeSpan::Year => "year",
            TimeSpan::All => "all",
        }
    }
}

/// Listing sort order. Hot is Reddit's default and has no path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageType {
    #[default]
    Hot,
    New,
    Rising,
    Controversial(Option<TimeSpan>),
    Top(Option<TimeSpan>),
}

impl PageType {
    /// Parse `hot`, `new`, `rising`, `controversial[-span]`, or `top[-span]`.
    ///
    /// Anything else, including the empty string, falls back to [PageType::Hot].
    pub fn parse_lenient(s: &str) -> PageType {
        let s = s.trim().to_ascii_lowercase();
        let (kind, span) = match s.split_once('-') {
            Some((kind, span)) => match TimeSpan::parse(span) {
                Some(span) => (kind, Some(span)),
                None => return PageType::Hot,
            },
            None => (s.as_str(), None),
        };
        match (kind, span) {
            ("new", None) => PageType::New,
            ("rising", None) => PageType::Rising,
            ("controversial", span) => PageType::Controversial(span),
            ("top", span) => PageType::Top(span),
            _ => PageType::Hot,
        }
    }

    fn path_segment(self) -> Option<&'static str> {
        match self {
            PageType::Hot => None,
            PageType::New => Some("new"),
            PageType::Rising => Some("rising"),
            PageType::Controversial(_) => Some("controversial"),
            PageType::Top(_) => Some("top"),
        }
    }

    fn time_span(self) -> Option<TimeSpan> {
        match self {
            PageType::Controversial(span) | PageType::Top(span) => span,
            _ => None,
        }
    }
}

/// A parsed feed page in one shape, whichever dialect it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    pub dialect: FeedDialect,
    pub entries: Vec<FeedEntry>,
}

impl FeedDocument {
    /// Parse a raw feed body. `url` is only used for error context.
    pub fn parse(dialect: FeedDialect, url: &str, body: &[u8]) -> Result<Self, ScrapeError> {
        let entries = match dialect {
            FeedDialect::Json => json::parse_listing(url, body)?,
            FeedDialect::Rss => atom::parse_feed(url, body)?,
        };
        Ok(FeedDocument { dialect, entries })
    }
}

/// One post in a feed. Every field is optional; the extractor decides what it needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub author_name: Option<String>,
    pub author_link: Option<String>,
    pub post_link: Option<String>,
    pub subreddit: Option<String>,
    pub category: Option<String>,
    pub body: EntryBody,
}

/// Where the image link lives for an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EntryBody {
    /// JSON listings: the post's declared domain and target URL.
    Link {
        domain: Option<String>,
        url: Option<String>,
    },
    /// RSS entries: HTML content that embeds the link.
    Html(String),
    #[default]
    Missing,
}

/// Builds feed URLs and fetches/parses pages for one dialect and page type.
#[derive(Debug, Clone)]
pub struct FeedClient {
    dialect: FeedDialect,
    page_type: PageType,
}

impl FeedClient {
    pub fn new(dialect: FeedDialect, page_type: PageType) -> Self {
        Self {
            dialect,
            page_type,
        }
    }

    /// Request URL for one page: `<site>/r/<sub>/[<page>/].<ext>?limit=<n>&after=<cursor>`.
    ///
    /// The name also becomes a directory, so path separators and `..` are rejected.
    pub fn request_url(
        &self,
        subreddit: &str,
        limit: u32,
        cursor: u32,
    ) -> Result<String, ScrapeError> {
        let subreddit = subreddit.trim();
        if subreddit.is_empty() {
            return Err(ScrapeError::InvalidArgument {
                name: "subreddit",
                reason: "subreddit is required for downloading".to_string(),
            });
        }
        if subreddit.contains(['/', '\\']) || subreddit.contains("..") {
            return Err(ScrapeError::InvalidArgument {
                name: "subreddit",
                reason: format!("'{}' is not a subreddit name", subreddit),
            });
        }
        let mut url = SITE_BASE.to_string();
        if subreddit != FRONTPAGE {
            url.push_str("/r/");
            url.push_str(subreddit);
        }
        url.push('/');
        if let Some(segment) = self.page_type.path_segment() {
            url.push_str(segment);
            url.push('/');
        }
        url.push_str(&format!(
            ".{}?limit={}&after={}",
            self.dialect.extension(),
            limit,
            cursor
        ));
        if let Some(span) = self.page_type.time_span() {
            url.push_str("&t=");
            url.push_str(span.as_str());
        }
        Ok(url)
    }

    /// Fetch and parse one page of a subreddit's feed.
    pub fn fetch(
        &self,
        http: &mut dyn HttpGet,
        subreddit: &str,
        limit: u32,
        cursor: u32,
    ) -> Result<FeedDocument, ScrapeError> {
        let url = self.request_url(subreddit, limit, cursor)?;
        let body = http.get_bytes(&url)?;
        FeedDocument::parse(self.dialect, &url, &body)
    }
}
