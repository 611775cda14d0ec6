//! Configuration management for trendfeed.
//!
//! Configuration is read from `~/.config/trendfeed/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

pub mod feeds;

pub use feeds::{FeedConfig, SourceOverride};

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::orchestrator::DEFAULT_WORKERS;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub orchestrator: OrchestratorConfig,
    pub feeds: Vec<FeedConfig>,
    pub overrides: HashMap<String, SourceOverride>,
}

/// Transport settings shared by every adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub accept_language: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1".to_string(),
            accept_language: "zh-CN,zh;q=0.9,en;q=0.8".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for hot lists, which turn over quickly.
    pub hot_list_ttl_secs: u64,
    /// TTL for RSS/Atom feeds.
    pub feed_ttl_secs: u64,
    /// Snapshot database. Defaults to `~/.local/share/trendfeed/cache.db`.
    pub db_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_list_ttl_secs: 900,
            feed_ttl_secs: 1800,
            db_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum concurrent upstream fetches.
    pub workers: usize,
    /// Upper bound on how long `fetch-many` waits for stragglers.
    pub collect_timeout_secs: u64,
    /// Serve expired entries immediately and refresh in the background.
    pub serve_stale_while_refreshing: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            collect_timeout_secs: 45,
            serve_stale_while_refreshing: false,
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/trendfeed/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("trendfeed").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> &'static str {
        r##"# trendfeed configuration

[http]
connect_timeout_secs = 15
timeout_secs = 30
# Several upstreams gate on a browser user agent.
user_agent = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1"
accept_language = "zh-CN,zh;q=0.9,en;q=0.8"

[cache]
# Hot lists turn over faster than long-form feeds.
hot_list_ttl_secs = 900
feed_ttl_secs = 1800
# db_path = "/path/to/cache.db"

[orchestrator]
workers = 10
collect_timeout_secs = 45
serve_stale_while_refreshing = false

# Subscribed feeds. kind is one of article, podcast, video, tweet.
#
# [[feeds]]
# id = "rust-blog"
# name = "Rust Blog"
# url = "https://blog.rust-lang.org/feed.xml"
# kind = "article"
# category = "开发工具"
# language = "english"

# Point a built-in source at a different upstream.
#
# [overrides.hackernews]
# url = "https://hacker-news.firebaseio.com/v0/topstories.json"
"##
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContentKind;

    #[test]
    fn test_default_config_deserializes() {
        let config: Config =
            toml::from_str(Config::default_config_content()).expect("Default config should be valid TOML");

        assert_eq!(config.http.connect_timeout_secs, 15);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.cache.hot_list_ttl_secs, 900);
        assert_eq!(config.cache.feed_ttl_secs, 1800);
        assert_eq!(config.orchestrator.workers, 10);
        assert!(config.feeds.is_empty());
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[cache]
feed_ttl_secs = 60

[[feeds]]
id = "pod"
name = "Some Podcast"
url = "https://example.com/pod.xml"
kind = "podcast"

[overrides.weibo]
url = "http://127.0.0.1:9000/weibo"
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.cache.feed_ttl_secs, 60);
        assert_eq!(config.cache.hot_list_ttl_secs, 900);
        assert_eq!(config.feeds[0].kind, ContentKind::Podcast);
        assert_eq!(config.overrides["weibo"].url, "http://127.0.0.1:9000/weibo");
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");
        assert_eq!(config.http.accept_language, "zh-CN,zh;q=0.9,en;q=0.8");
        assert!(!config.orchestrator.serve_stale_while_refreshing);
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[cache\nbroken").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
