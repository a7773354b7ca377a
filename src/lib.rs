//! mavic: CLI scraper that downloads imgur images posted to subreddits.

pub mod cli;
pub mod config;
pub mod dedupe;
pub mod download;
pub mod extract;
pub mod model;
pub mod reddit;
pub mod scrape;

// Re-exports for CLI and consumers.
pub use dedupe::Deduplicator;
pub use download::{DownloadOutcome, Downloader};
pub use extract::{Extraction, LinkExtractor};
pub use model::{Author, Image};
pub use reddit::{
    FeedClient, FeedDialect, FeedDocument, HttpGet, PageType, PoliteClient, PoliteClientBuilder,
    ScrapeError,
};
pub use scrape::{ScrapeEvent, ScrapeOptions, ScrapeSummary, Scraper};
