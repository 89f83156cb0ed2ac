//! Configuration types for telegram-media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Telegram account and session configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Session name for the listing client (default: "default_session")
    #[serde(default = "default_session_name")]
    pub session_name: String,

    /// Bot API token for the bundled HTTP fetcher (None when the embedder
    /// supplies its own fetcher)
    #[serde(default)]
    pub bot_token: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            session_name: default_session_name(),
            bot_token: None,
        }
    }
}

/// Download behavior configuration (output layout, concurrency, retries)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Output directory for downloaded media (default: "downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Ledger file recording completed downloads (default: "download_state.json")
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Maximum concurrent downloads (default: 5)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Aggregate speed limit in bytes per second (None = unlimited)
    #[serde(default)]
    pub speed_limit_bps: Option<u64>,

    /// Write a JSON metadata sidecar next to each downloaded file (default: true)
    #[serde(default = "default_true")]
    pub preserve_metadata: bool,

    /// Place files under a per-channel folder (default: true)
    #[serde(default = "default_true")]
    pub organize_by_channel: bool,

    /// Place files under a per-date folder (default: false)
    #[serde(default)]
    pub organize_by_date: bool,

    /// Retry policy for transient fetch failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            ledger_path: default_ledger_path(),
            batch_size: default_batch_size(),
            speed_limit_bps: None,
            preserve_metadata: true,
            organize_by_channel: true,
            organize_by_date: false,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum total attempts per file, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 5 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 300 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Filter configuration applied to every listed candidate
///
/// The filter set is taken as an immutable snapshot at the start of a run;
/// editing config mid-run has no effect on that run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum file size in bytes, inclusive (default: 0)
    #[serde(default)]
    pub min_file_size: u64,

    /// Maximum file size in bytes, inclusive (default: 1000 MiB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Whitelist of extensions; empty means all extensions pass this check
    #[serde(default)]
    pub allowed_extensions: Vec<String>,

    /// Blacklist of extensions, checked after the whitelist
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_file_size: 0,
            max_file_size: default_max_file_size(),
            allowed_extensions: Vec::new(),
            excluded_extensions: default_excluded_extensions(),
        }
    }
}

/// Main configuration for MediaDownloader
///
/// Fields are organized into logical sub-configs:
/// - [`telegram`](TelegramConfig) - session and token
/// - [`download`](DownloadConfig) - output layout, concurrency, retries
/// - [`filter`](FilterConfig) - size and extension rules
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Telegram account settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Candidate filtering rules
    #[serde(default)]
    pub filter: FilterConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {e}", path.as_ref().display()),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values, returning the first violation found
    pub fn validate(&self) -> Result<()> {
        if self.download.batch_size == 0 {
            return Err(Error::Config {
                message: "batch_size must be at least 1".into(),
                key: Some("download.batch_size".into()),
            });
        }
        if self.download.retry.max_attempts == 0 {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".into(),
                key: Some("download.retry.max_attempts".into()),
            });
        }
        if self.download.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff_multiplier must be at least 1.0".into(),
                key: Some("download.retry.backoff_multiplier".into()),
            });
        }
        if self.filter.min_file_size > self.filter.max_file_size {
            return Err(Error::Config {
                message: format!(
                    "min_file_size ({}) exceeds max_file_size ({})",
                    self.filter.min_file_size, self.filter.max_file_size
                ),
                key: Some("filter.min_file_size".into()),
            });
        }
        if let Some(limit) = self.download.speed_limit_bps
            && limit == 0
        {
            return Err(Error::Config {
                message: "speed_limit_bps must be positive; omit it for unlimited".into(),
                key: Some("download.speed_limit_bps".into()),
            });
        }
        Ok(())
    }
}

// Default value functions
fn default_session_name() -> String {
    "default_session".into()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("download_state.json")
}

fn default_batch_size() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_file_size() -> u64 {
    1000 * 1024 * 1024 // 1000 MiB
}

fn default_excluded_extensions() -> Vec<String> {
    vec![".exe".into(), ".bat".into(), ".sh".into()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
