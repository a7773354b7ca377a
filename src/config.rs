//! Optional config file loading. Search order: ./mavic.toml, then
//! $XDG_CONFIG_HOME/mavic/config.toml (or ~/.config/mavic/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Default output directory when -o is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// Posts per subreddit (default 50; 0, negative, or above 500 resets to 50).
    pub limit: Option<i64>,
    /// Listing sort: hot, new, rising, controversial[-span], top[-span].
    pub page_type: Option<String>,
    /// Also scrape the front page.
    pub front_page: Option<bool>,
    /// Feed format: json (default) or rss.
    pub feed: Option<String>,
    /// Detect the real file type from its first bytes (default true).
    pub sniff: Option<bool>,
    /// Put every image directly in the output directory.
    pub root_folder_only: Option<bool>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Delay in seconds between requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts for transient failures (default 3).
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2]).
    pub retry_backoff_secs: Option<Vec<u64>>,
}

/// Search order: (1) ./mavic.toml, (2) $XDG_CONFIG_HOME/mavic/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("mavic.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("mavic").join("config.toml"));
    }
    load_first(&paths)
}

fn load_first(paths: &[PathBuf]) -> Result<Option<Config>, String> {
    for path in paths {
        if path.exists() {
            return read_config(path).map(Some);
        }
    }
    Ok(None)
}

fn read_config(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}
