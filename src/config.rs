//! Configuration types for feishu-export

use crate::error::{Error, Result};
use crate::types::DocType;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, path::PathBuf, time::Duration};

/// Remote codes of the rate-limit family
pub const DEFAULT_RETRYABLE_CODES: [i64; 2] = [99991400, 11232];

/// Open API base URL for Feishu hosts
pub const FEISHU_API_BASE: &str = "https://open.feishu.cn/open-apis";

/// Open API base URL for Lark (international) hosts
pub const LARK_API_BASE: &str = "https://open.larksuite.com/open-apis";

/// Top-level configuration record
///
/// Built by the CLI from flags, environment and an optional JSON file, then
/// checked with [`Config::validate`] before anything touches the network.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Application id of the self-built app (`cli_xxx`)
    #[serde(default)]
    pub app_id: String,

    /// Application secret
    #[serde(default)]
    pub app_secret: String,

    /// Source URLs: documents, folders, wiki nodes or wiki spaces
    #[serde(default)]
    pub doc_urls: Vec<String>,

    /// Output directory (default: "./dist")
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,

    /// Per-kind override of the exported artifact extension, e.g. `docx -> pdf`
    #[serde(default)]
    pub file_extensions: HashMap<DocType, String>,

    /// Discover and write `document-tree.json`, then stop
    #[serde(default)]
    pub list_only: bool,

    /// Leave the progress UI once every file reached a terminal state
    #[serde(default)]
    pub quit_automatically: bool,

    /// Debug-level logging
    #[serde(default)]
    pub verbose: bool,

    /// Override of the Open API base URL
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Moment the run started; deadlines are measured from here
    #[serde(skip, default = "Local::now")]
    pub start_time: DateTime<Local>,

    /// Retry behavior around remote calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Worker pool sizing
    #[serde(default)]
    pub workers: WorkerConfig,

    /// Pauses between polls and hand-offs
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Tree discovery limits
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            doc_urls: Vec::new(),
            save_dir: default_save_dir(),
            file_extensions: HashMap::new(),
            list_only: false,
            quit_automatically: false,
            verbose: false,
            api_base_url: None,
            start_time: Local::now(),
            retry: RetryConfig::default(),
            workers: WorkerConfig::default(),
            pacing: PacingConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl Config {
    /// Load a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })
    }

    /// Check the record before a run
    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(Error::InvalidArgument("app id is required".into()));
        }
        if self.app_secret.trim().is_empty() {
            return Err(Error::InvalidArgument("app secret is required".into()));
        }
        if self.doc_urls.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one document URL is required".into(),
            ));
        }
        if self.save_dir.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "save directory must not be empty".into(),
                key: Some("save_dir".into()),
            });
        }
        self.workers.validate()?;
        self.retry.validate()?;
        for (doc_type, ext) in &self.file_extensions {
            if ext.trim().is_empty() {
                return Err(Error::Config {
                    message: format!("empty file extension for {doc_type}"),
                    key: Some("file_extensions".into()),
                });
            }
        }
        Ok(())
    }

    /// Open API base URL for the given document host
    pub fn api_base_for_host(&self, host: &str) -> String {
        if let Some(base) = &self.api_base_url {
            return base.trim_end_matches('/').to_string();
        }
        if host.ends_with("larksuite.com") {
            LARK_API_BASE.to_string()
        } else {
            FEISHU_API_BASE.to_string()
        }
    }

    /// Time elapsed since [`Config::start_time`]
    pub fn elapsed(&self) -> Duration {
        (Local::now() - self.start_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Retry configuration for rate-limited remote calls
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of invocations (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 5 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Randomization factor applied to each delay (default: 0.2 = ±20%)
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Remote codes that schedule another attempt
    #[serde(default = "default_retryable_codes")]
    pub retryable_codes: Vec<i64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
            retryable_codes: default_retryable_codes(),
        }
    }
}

impl RetryConfig {
    /// Whether a remote code schedules another attempt
    pub fn is_retryable(&self, code: i64) -> bool {
        self.retryable_codes.contains(&code)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".into(),
                key: Some("retry.max_attempts".into()),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::Config {
                message: "jitter must be between 0.0 and 1.0".into(),
                key: Some("retry.jitter".into()),
            });
        }
        Ok(())
    }
}

/// Worker pool sizing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Concurrent export workers (default: 5)
    #[serde(default = "default_exporters")]
    pub exporters: usize,

    /// Concurrent download workers (default: 3)
    #[serde(default = "default_downloaders")]
    pub downloaders: usize,

    /// Capacity of the exporter → downloader queue (default: 20)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            exporters: default_exporters(),
            downloaders: default_downloaders(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl WorkerConfig {
    fn validate(&self) -> Result<()> {
        if self.exporters == 0 || self.downloaders == 0 {
            return Err(Error::Config {
                message: "worker pools need at least one worker each".into(),
                key: Some("workers".into()),
            });
        }
        if self.queue_capacity < self.exporters {
            return Err(Error::Config {
                message: format!(
                    "queue capacity {} is smaller than the exporter count {}",
                    self.queue_capacity, self.exporters
                ),
                key: Some("workers.queue_capacity".into()),
            });
        }
        Ok(())
    }
}

/// Inclusive range a random pause is drawn from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    /// Lower bound
    #[serde(with = "duration_serde")]
    pub min: Duration,
    /// Upper bound
    #[serde(with = "duration_serde")]
    pub max: Duration,
}

impl DelayRange {
    /// Range between two whole-second bounds
    pub const fn secs(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_secs(min),
            max: Duration::from_secs(max),
        }
    }

    /// A range that never sleeps
    pub const fn zero() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }
}

/// Pauses between polls and hand-offs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Pause before each export status poll (default: 1–5s)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: DelayRange,

    /// Pause after an export finishes and after a download completes (default: 1–3s)
    #[serde(default = "default_settle_pause")]
    pub settle_pause: DelayRange,

    /// Pause before quitting automatically (default: 1–3s)
    #[serde(default = "default_settle_pause")]
    pub quit_pause: DelayRange,

    /// How long an idle downloader waits on the queue before re-checking (default: 200ms)
    #[serde(skip, default = "default_idle_poll")]
    pub idle_poll: Duration,

    /// Export status polls per document (default: 5)
    #[serde(default = "default_max_export_polls")]
    pub max_export_polls: u32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            settle_pause: default_settle_pause(),
            quit_pause: default_settle_pause(),
            idle_poll: default_idle_poll(),
            max_export_polls: default_max_export_polls(),
        }
    }
}

impl PacingConfig {
    /// Pacing without any sleeps, for tests and demos
    pub fn immediate() -> Self {
        Self {
            poll_interval: DelayRange::zero(),
            settle_pause: DelayRange::zero(),
            quit_pause: DelayRange::zero(),
            idle_poll: Duration::from_millis(10),
            max_export_polls: default_max_export_polls(),
        }
    }
}

/// Tree discovery limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Soft deadline for wiki descent, measured from the run start (default: 60s)
    #[serde(default = "default_wiki_deadline", with = "duration_serde")]
    pub wiki_deadline: Duration,

    /// Wiki listing page size (default: 50)
    #[serde(default = "default_wiki_page_size")]
    pub wiki_page_size: u32,

    /// Drive listing page size (default: 200)
    #[serde(default = "default_drive_page_size")]
    pub drive_page_size: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            wiki_deadline: default_wiki_deadline(),
            wiki_page_size: default_wiki_page_size(),
            drive_page_size: default_drive_page_size(),
        }
    }
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.2
}

fn default_retryable_codes() -> Vec<i64> {
    DEFAULT_RETRYABLE_CODES.to_vec()
}

fn default_exporters() -> usize {
    5
}

fn default_downloaders() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    20
}

fn default_poll_interval() -> DelayRange {
    DelayRange::secs(1, 5)
}

fn default_settle_pause() -> DelayRange {
    DelayRange::secs(1, 3)
}

fn default_idle_poll() -> Duration {
    Duration::from_millis(200)
}

fn default_max_export_polls() -> u32 {
    5
}

fn default_wiki_deadline() -> Duration {
    Duration::from_secs(60)
}

fn default_wiki_page_size() -> u32 {
    50
}

fn default_drive_page_size() -> u32 {
    200
}

// Duration serialization helper (whole seconds)
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
