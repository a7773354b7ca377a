//! Scrape run: for each subreddit, fetch pages, extract images, dedupe, download.
//!
//! Failures never escape a subreddit. A failed page is reported and the next cursor is
//! tried; a failed image is counted and the next image is tried; a subreddit whose
//! directory cannot be created is reported and the run moves on.

use crate::dedupe::Deduplicator;
use crate::download::{DownloadOutcome, Downloader};
use crate::extract::{LinkExtractor, SkippedEntry};
use crate::model::Image;
use crate::reddit::{FeedClient, HttpGet, ScrapeError, FRONTPAGE, MAX_PAGE_SIZE};
use std::path::{Path, PathBuf};

/// Images per subreddit when no limit (or an out-of-range one) is given.
pub const DEFAULT_LIMIT: u32 = 50;
/// Largest accepted per-subreddit limit.
pub const MAX_LIMIT: u32 = 500;

/// Limits of 0 or above [MAX_LIMIT] fall back to [DEFAULT_LIMIT].
pub fn clamp_limit(limit: u32) -> u32 {
    if limit == 0 || limit > MAX_LIMIT {
        DEFAULT_LIMIT
    } else {
        limit
    }
}

/// `(cursor, page_limit)` for each page needed to cover `limit` posts.
pub fn page_cursors(limit: u32) -> Vec<(u32, u32)> {
    (0..limit)
        .step_by(MAX_PAGE_SIZE as usize)
        .map(|cursor| (cursor, (limit - cursor).min(MAX_PAGE_SIZE)))
        .collect()
}

/// What to scrape and where to put it.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub output_dir: PathBuf,
    /// Posts to request per subreddit; see [clamp_limit].
    pub limit: u32,
    /// Prepend the site-wide front page to the subreddit list.
    pub front_page: bool,
    /// Write every image into `output_dir` instead of one directory per subreddit.
    pub root_folder_only: bool,
    pub subreddits: Vec<String>,
}

impl ScrapeOptions {
    /// Subreddits in processing order, front page first when enabled.
    pub fn subreddit_list(&self) -> Vec<String> {
        let mut list = Vec::with_capacity(self.subreddits.len() + 1);
        if self.front_page {
            list.push(FRONTPAGE.to_string());
        }
        list.extend(self.subreddits.iter().map(|s| s.trim().to_string()));
        list
    }

    pub fn directory_for(&self, subreddit: &str) -> PathBuf {
        if self.root_folder_only {
            self.output_dir.clone()
        } else {
            self.output_dir.join(subreddit)
        }
    }
}

/// Why an image was not downloaded without that being a failure.
#[derive(Debug)]
pub enum ImageSkip<'e> {
    /// No image id could be derived from the link.
    NoImageId,
    /// Already handled earlier in this run for the same subreddit.
    Duplicate,
    AlreadyOnDisk(&'e Path),
    /// The downloader declined: unsupported asset or a conflicting file.
    Declined(&'e ScrapeError),
}

/// Progress reported during a run.
#[derive(Debug)]
pub enum ScrapeEvent<'e> {
    SubredditStarted {
        subreddit: &'e str,
        directory: &'e Path,
    },
    PageFetched {
        subreddit: &'e str,
        cursor: u32,
        images: usize,
    },
    PageFailed {
        subreddit: &'e str,
        cursor: u32,
        error: &'e ScrapeError,
    },
    EntrySkipped {
        subreddit: &'e str,
        entry: &'e SkippedEntry,
    },
    Downloading {
        image: &'e Image,
    },
    Downloaded {
        image: &'e Image,
        path: &'e Path,
    },
    ImageSkipped {
        image: &'e Image,
        reason: ImageSkip<'e>,
    },
    ImageFailed {
        image: &'e Image,
        error: &'e ScrapeError,
    },
    SubredditFailed {
        subreddit: &'e str,
        error: &'e ScrapeError,
    },
    /// All pages read; `images` distinct image ids were handled.
    SubredditFinished {
        subreddit: &'e str,
        images: usize,
    },
}

/// Counts for a finished run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_subreddits: Vec<String>,
}

impl ScrapeSummary {
    pub fn processed(&self) -> usize {
        self.downloaded + self.skipped + self.failed
    }
}

/// Drives feed client, extractor, deduplicator, and downloader over a subreddit list.
pub struct Scraper<'a> {
    http: &'a mut dyn HttpGet,
    feed: FeedClient,
    extractor: LinkExtractor,
    downloader: Downloader,
    dedupe: Deduplicator,
    on_event: Option<&'a dyn Fn(&ScrapeEvent<'_>)>,
}

impl<'a> Scraper<'a> {
    pub fn new(
        http: &'a mut dyn HttpGet,
        feed: FeedClient,
        extractor: LinkExtractor,
        downloader: Downloader,
    ) -> Self {
        Self {
            http,
            feed,
            extractor,
            downloader,
            dedupe: Deduplicator::new(),
            on_event: None,
        }
    }

    /// Report progress to `callback`.
    pub fn on_event(mut self, callback: &'a dyn Fn(&ScrapeEvent<'_>)) -> Self {
        self.on_event = Some(callback);
        self
    }

    /// Scrape every subreddit in order. Never fails; see [ScrapeSummary] for what happened.
    pub fn run(&mut self, options: &ScrapeOptions) -> ScrapeSummary {
        let mut summary = ScrapeSummary::default();
        for subreddit in options.subreddit_list() {
            if let Err(error) = self.scrape_subreddit(&subreddit, options, &mut summary) {
                self.emit(&ScrapeEvent::SubredditFailed {
                    subreddit: &subreddit,
                    error: &error,
                });
                summary.failed_subreddits.push(subreddit);
            }
        }
        summary
    }

    fn scrape_subreddit(
        &mut self,
        subreddit: &str,
        options: &ScrapeOptions,
        summary: &mut ScrapeSummary,
    ) -> Result<(), ScrapeError> {
        let limit = clamp_limit(options.limit);
        // Reject a bad name before touching the filesystem.
        self.feed.request_url(subreddit, limit, 0)?;

        let directory = options.directory_for(subreddit);
        std::fs::create_dir_all(&directory).map_err(|e| ScrapeError::io(&directory, e))?;
        self.emit(&ScrapeEvent::SubredditStarted {
            subreddit,
            directory: &directory,
        });

        for (cursor, page_limit) in page_cursors(limit) {
            let doc = match self
                .feed
                .fetch(&mut *self.http, subreddit, page_limit, cursor)
            {
                Ok(doc) => doc,
                Err(error) => {
                    self.emit(&ScrapeEvent::PageFailed {
                        subreddit,
                        cursor,
                        error: &error,
                    });
                    continue;
                }
            };
            if doc.entries.is_empty() {
                break;
            }

            let extraction = self.extractor.extract(&doc);
            for entry in &extraction.skipped {
                self.emit(&ScrapeEvent::EntrySkipped { subreddit, entry });
            }
            self.emit(&ScrapeEvent::PageFetched {
                subreddit,
                cursor,
                images: extraction.images.len(),
            });

            for mut image in extraction.images {
                if image.subreddit.is_empty() {
                    image.subreddit = subreddit.to_string();
                }
                self.process_image(subreddit, &directory, &image, summary);
            }
        }
        self.emit(&ScrapeEvent::SubredditFinished {
            subreddit,
            images: self.dedupe.seen_count(subreddit),
        });
        Ok(())
    }

    fn process_image(
        &mut self,
        subreddit: &str,
        directory: &Path,
        image: &Image,
        summary: &mut ScrapeSummary,
    ) {
        if !self.dedupe.should_download(subreddit, &image.image_id) {
            let reason = if image.is_downloadable() {
                ImageSkip::Duplicate
            } else {
                ImageSkip::NoImageId
            };
            summary.skipped += 1;
            self.emit(&ScrapeEvent::ImageSkipped { image, reason });
            return;
        }
        self.dedupe.mark_downloaded(subreddit, &image.image_id);

        self.emit(&ScrapeEvent::Downloading { image });
        match self.downloader.download(&mut *self.http, directory, image) {
            Ok(DownloadOutcome::Saved(path)) => {
                summary.downloaded += 1;
                self.emit(&ScrapeEvent::Downloaded { image, path: &path });
            }
            Ok(DownloadOutcome::AlreadyExists(path)) => {
                summary.skipped += 1;
                self.emit(&ScrapeEvent::ImageSkipped {
                    image,
                    reason: ImageSkip::AlreadyOnDisk(&path),
                });
            }
            Err(error) if error.is_skip() => {
                summary.skipped += 1;
                self.emit(&ScrapeEvent::ImageSkipped {
                    image,
                    reason: ImageSkip::Declined(&error),
                });
            }
            Err(error) => {
                summary.failed += 1;
                self.emit(&ScrapeEvent::ImageFailed {
                    image,
                    error: &error,
                });
            }
        }
    }

    fn emit(&self, event: &ScrapeEvent<'_>) {
        if let Some(callback) = self.on_event {
            callback(event);
        }
    }
}
