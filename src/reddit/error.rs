//! Shared error type for feed fetching, extraction, and downloads.

use std::path::PathBuf;
use thiserror::Error;

/// Error for one feed request or one image download.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    // Fetch failures: network, status, body, feed shape.
    #[error("Network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Could not parse feed from {url}: {reason}")]
    MalformedFeed { url: String, reason: String },

    // Per-image outcomes.
    #[error("Unsupported asset (gallery or unknown format): {link}")]
    UnsupportedAsset { link: String },

    #[error("Downloaded file is not media (HTML, JSON, or empty body): {url}")]
    NotMedia { url: String },

    #[error("File already exists under its detected type: {}", path.display())]
    WriteConflict { path: PathBuf },

    #[error("Filesystem error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScrapeError {
    /// True for the network, HTTP status, body read, and malformed feed variants.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            ScrapeError::Network { .. }
                | ScrapeError::HttpStatus { .. }
                | ScrapeError::BodyRead { .. }
                | ScrapeError::MalformedFeed { .. }
        )
    }

    /// Errors that mean "nothing to do for this image" rather than a failed download.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            ScrapeError::UnsupportedAsset { .. } | ScrapeError::WriteConflict { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScrapeError::Io {
            path: path.into(),
            source,
        }
    }
}
