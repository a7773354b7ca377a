//! CLI parsing and orchestration. Merges flags over the config file, builds the HTTP client,
//! runs the scrape, and renders its progress. Maps errors to exit codes.

use crate::config::{self, Config};
use crate::download::Downloader;
use crate::extract::LinkExtractor;
use crate::reddit::{FeedClient, FeedDialect, PageType, PoliteClient};
use crate::scrape::{
    clamp_limit, page_cursors, ImageSkip, ScrapeEvent, ScrapeOptions, ScrapeSummary, Scraper,
    DEFAULT_LIMIT,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Client(_) => 2,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mavic")]
#[command(about = "Download imgur images posted to subreddits")]
#[command(
    after_help = "Config file keys (output_dir, limit, page_type, front_page, feed, sniff, root_folder_only, user_agent, request_delay_secs, timeout_secs, retry_count, retry_backoff_secs) are read from ./mavic.toml or <config dir>/mavic/config.toml. CLI flags override config."
)]
pub struct Args {
    /// Output directory; each subreddit gets a subdirectory. Default: ./
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Posts to fetch per subreddit (default 50; 0, negative, or above 500 resets to 50).
    #[arg(short, long, allow_negative_numbers = true)]
    pub limit: Option<i64>,

    /// Also scrape the front page, before the listed subreddits.
    #[arg(short, long)]
    pub front: bool,

    /// Listing sort: hot, new, rising, controversial[-span], top[-span] where span is
    /// hour, day, week, month, year, or all. Unknown values use hot.
    #[arg(short = 't', long = "type")]
    pub page_type: Option<String>,

    /// Subreddits to scrape, space or comma separated.
    #[arg(short, long, required = true, num_args = 1.., value_delimiter = ',')]
    pub subreddits: Vec<String>,

    /// Feed format to read: json (default) or rss.
    #[arg(long, value_parser = parse_feed)]
    pub feed: Option<FeedDialect>,

    /// Keep the URL's extension instead of detecting the file type from its content.
    #[arg(long)]
    pub no_sniff: bool,

    /// Save every image directly in the output directory.
    #[arg(long)]
    pub root_only: bool,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 1).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print the feed URLs and target directories without fetching anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Report skipped entries and images, and print the error chain on failure.
    #[arg(long)]
    pub verbose: bool,
}

fn parse_feed(s: &str) -> Result<FeedDialect, String> {
    match s.trim().to_lowercase().as_str() {
        "json" => Ok(FeedDialect::Json),
        "rss" | "atom" | "xml" => Ok(FeedDialect::Rss),
        _ => Err(format!("Invalid feed value: '{}'. Use json or rss.", s)),
    }
}

/// Non-positive and oversized limits fall back to the default.
fn limit_from(n: i64) -> u32 {
    u32::try_from(n).map_or(DEFAULT_LIMIT, clamp_limit)
}

/// Flags merged over config merged over defaults.
#[derive(Debug)]
struct Settings {
    options: ScrapeOptions,
    dialect: FeedDialect,
    page_type: PageType,
    sniff: bool,
    user_agent: Option<String>,
    delay_secs: Option<u64>,
    timeout_secs: Option<u64>,
    retry_count: Option<u32>,
    retry_backoff_secs: Option<Vec<u64>>,
}

fn resolve(args: &Args, config: Option<&Config>) -> Result<Settings, CliRunError> {
    let dialect = match args.feed {
        Some(d) => d,
        None => match config.and_then(|c| c.feed.as_deref()) {
            Some(s) => parse_feed(s)
                .map_err(|e| CliRunError::InvalidInput(format!("Config key feed: {}", e)))?,
            None => FeedDialect::Json,
        },
    };
    let page_type = args
        .page_type
        .as_deref()
        .or_else(|| config.and_then(|c| c.page_type.as_deref()))
        .map(PageType::parse_lenient)
        .unwrap_or_default();
    let output_dir = args
        .output
        .clone()
        .or_else(|| config.and_then(|c| c.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."));
    let limit = args
        .limit
        .or_else(|| config.and_then(|c| c.limit))
        .map_or(DEFAULT_LIMIT, limit_from);

    Ok(Settings {
        options: ScrapeOptions {
            output_dir,
            limit,
            front_page: args.front || config.and_then(|c| c.front_page).unwrap_or(false),
            root_folder_only: args.root_only
                || config.and_then(|c| c.root_folder_only).unwrap_or(false),
            subreddits: args.subreddits.clone(),
        },
        dialect,
        page_type,
        sniff: !args.no_sniff && config.and_then(|c| c.sniff).unwrap_or(true),
        user_agent: args
            .user_agent
            .clone()
            .or_else(|| config.and_then(|c| c.user_agent.clone())),
        delay_secs: args
            .delay
            .or_else(|| config.and_then(|c| c.request_delay_secs)),
        timeout_secs: args.timeout.or_else(|| config.and_then(|c| c.timeout_secs)),
        retry_count: config.and_then(|c| c.retry_count),
        retry_backoff_secs: config.and_then(|c| c.retry_backoff_secs.clone()),
    })
}

fn build_client(settings: &Settings) -> Result<PoliteClient, CliRunError> {
    let mut builder = PoliteClient::builder();
    if let Some(ua) = &settings.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    if let Some(secs) = settings.delay_secs {
        builder = builder.delay_secs(secs);
    }
    if let Some(secs) = settings.timeout_secs {
        builder = builder.timeout_secs(secs);
    }
    if let Some(n) = settings.retry_count {
        builder = builder.retry_count(n);
    }
    if let Some(secs) = &settings.retry_backoff_secs {
        builder = builder.retry_backoff_secs(secs.clone());
    }
    Ok(builder.build()?)
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg} ({elapsed})") {
        bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn describe_skip(reason: &ImageSkip<'_>) -> String {
    match reason {
        ImageSkip::NoImageId => "no image id in link".to_string(),
        ImageSkip::Duplicate => "already handled this run".to_string(),
        ImageSkip::AlreadyOnDisk(path) => format!("already saved as {}", path.display()),
        ImageSkip::Declined(e) => e.to_string(),
    }
}

/// Warnings go to stderr with the spinner hidden; `None` means the event is not worth a line.
fn event_line(event: &ScrapeEvent<'_>, verbose: bool) -> Option<String> {
    match event {
        ScrapeEvent::PageFailed {
            subreddit,
            cursor,
            error,
        } => Some(format!(
            "Warning: r/{} page at {} failed: {}",
            subreddit, cursor, error
        )),
        ScrapeEvent::SubredditFailed { subreddit, error } => {
            Some(format!("Warning: skipping r/{}: {}", subreddit, error))
        }
        ScrapeEvent::ImageFailed { image, error } => {
            let what = if error.is_fetch_failure() {
                "fetch"
            } else {
                "save"
            };
            Some(format!(
                "Warning: could not {} {} ({}): {}",
                what, image.image_id, image.link, error
            ))
        }
        ScrapeEvent::EntrySkipped { subreddit, entry } if verbose => Some(format!(
            "Skipped entry {} in r/{}: {}",
            entry.position + 1,
            subreddit,
            entry.reason
        )),
        ScrapeEvent::ImageSkipped { image, reason } if verbose => Some(format!(
            "Skipped {}: {}",
            image.link,
            describe_skip(reason)
        )),
        ScrapeEvent::Downloaded { path, .. } if verbose => {
            Some(format!("Saved {}", path.display()))
        }
        ScrapeEvent::SubredditFinished { subreddit, images } if verbose => {
            Some(format!("Finished r/{}: {} distinct images", subreddit, images))
        }
        _ => None,
    }
}

fn render_event(bar: &ProgressBar, event: &ScrapeEvent<'_>, verbose: bool) {
    match event {
        ScrapeEvent::SubredditStarted { subreddit, .. } => {
            bar.set_message(format!("Reading r/{}", subreddit));
        }
        ScrapeEvent::Downloading { image } => {
            bar.set_message(format!(
                "Downloading {} from r/{}",
                image.image_id, image.subreddit
            ));
        }
        _ => {}
    }
    if let Some(line) = event_line(event, verbose) {
        bar.suspend(|| eprintln!("{}", line));
    }
}

fn summary_line(summary: &ScrapeSummary) -> String {
    let mut line = format!(
        "Downloaded {}, skipped {}, failed {}",
        summary.downloaded, summary.skipped, summary.failed
    );
    if !summary.failed_subreddits.is_empty() {
        line.push_str(&format!(
            "; failed subreddits: {}",
            summary.failed_subreddits.join(", ")
        ));
    }
    line
}

fn print_dry_run(settings: &Settings, feed: &FeedClient) {
    let limit = clamp_limit(settings.options.limit);
    for subreddit in settings.options.subreddit_list() {
        let directory = settings.options.directory_for(&subreddit);
        eprintln!("r/{} -> {}", subreddit, directory.display());
        for (cursor, page_limit) in page_cursors(limit) {
            match feed.request_url(&subreddit, page_limit, cursor) {
                Ok(url) => println!("{}", url),
                Err(e) => {
                    eprintln!("Warning: {}", e);
                    break;
                }
            }
        }
    }
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
///
/// Per-subreddit, per-page, and per-image failures are reported and counted, never returned.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let settings = resolve(args, config.as_ref())?;
    let feed = FeedClient::new(settings.dialect, settings.page_type);

    if args.dry_run {
        print_dry_run(&settings, &feed);
        return Ok(());
    }

    let extractor = LinkExtractor::new()
        .map_err(|e| CliRunError::InvalidInput(format!("Bad link pattern: {}", e)))?;
    let mut client = build_client(&settings)?;

    let bar = if args.quiet { None } else { Some(spinner()) };
    let verbose = args.verbose;
    let render = |event: &ScrapeEvent<'_>| {
        if let Some(bar) = bar.as_ref() {
            render_event(bar, event, verbose);
        }
    };

    let mut scraper = Scraper::new(
        &mut client,
        feed,
        extractor,
        Downloader::new(settings.sniff),
    );
    if !args.quiet {
        scraper = scraper.on_event(&render);
    }
    let summary = scraper.run(&settings.options);

    if let Some(bar) = bar.as_ref() {
        bar.disable_steady_tick();
        bar.finish_and_clear();
    }
    if !args.quiet {
        eprintln!("{}", summary_line(&summary));
    }
    Ok(())
}
