use std::path::{Path, PathBuf};
use std::time::Duration;

use dlp_core::{Compression, GroupOrdering, RetryConfig, ShardNaming};
use serde::{Deserialize, Serialize};

/// Configuration for dlp-stream
///
/// Every section may be omitted; required identifiers (project, templates,
/// bucket pattern, output path) are checked by [`Config::validate`] after
/// command-line overrides have been applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dlp: DlpConfig,

    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlpConfig {
    /// Project that owns the templates; sent as `projects/<project>`
    #[serde(default)]
    pub project: String,

    #[serde(default)]
    pub deidentify_template: String,

    #[serde(default)]
    pub inspect_template: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_dlp_timeout")]
    pub timeout_secs: u64,

    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub access_token_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Glob-like pattern of files to watch
    #[serde(default)]
    pub bucket_url: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub compression: Compression,

    /// Objects matching any of these globs are never emitted
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_length")]
    pub length_secs: u64,

    /// Delay between the first element of a pane and its firing
    #[serde(default = "default_fire_delay")]
    pub fire_delay_ms: u64,

    #[serde(default)]
    pub allowed_lateness_secs: u64,

    #[serde(default)]
    pub ordering: GroupOrdering,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub path: String,

    #[serde(default = "default_suffix")]
    pub suffix: String,

    #[serde(default)]
    pub naming: ShardNaming,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_redaction_retry")]
    pub redaction: RetrySection,

    #[serde(default = "default_write_retry")]
    pub write: RetrySection,
}

/// Backoff settings; fields missing from a partial section fall back to
/// the generic defaults, not the section-specific ones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_max_open_files")]
    pub max_open_files: usize,

    #[serde(default = "default_max_inflight_redactions")]
    pub max_inflight_redactions: usize,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for DlpConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            deidentify_template: String::new(),
            inspect_template: String::new(),
            endpoint: default_endpoint(),
            timeout_secs: default_dlp_timeout(),
            access_token_env: default_token_env(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            bucket_url: String::new(),
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            compression: Compression::default(),
            exclude: Vec::new(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            length_secs: default_window_length(),
            fire_delay_ms: default_fire_delay(),
            allowed_lateness_secs: 0,
            ordering: GroupOrdering::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            suffix: default_suffix(),
            naming: ShardNaming::default(),
            write_timeout_secs: default_write_timeout(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            redaction: default_redaction_retry(),
            write: default_write_retry(),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_open_files: default_max_open_files(),
            max_inflight_redactions: default_max_inflight_redactions(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_endpoint() -> String {
    "https://dlp.googleapis.com/v2".to_string()
}

fn default_dlp_timeout() -> u64 {
    30
}

fn default_token_env() -> String {
    "DLP_ACCESS_TOKEN".to_string()
}

fn default_poll_interval() -> u64 {
    300
}

fn default_batch_size() -> usize {
    51_200
}

fn default_window_length() -> u64 {
    60
}

fn default_fire_delay() -> u64 {
    5_000
}

fn default_suffix() -> String {
    ".txt".to_string()
}

fn default_write_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    200
}

fn default_max_backoff() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_redaction_retry() -> RetrySection {
    RetrySection {
        max_attempts: default_max_attempts(),
        initial_backoff_ms: default_initial_backoff(),
        max_backoff_ms: default_max_backoff(),
        backoff_multiplier: default_multiplier(),
    }
}

fn default_write_retry() -> RetrySection {
    RetrySection {
        max_attempts: 5,
        initial_backoff_ms: 500,
        max_backoff_ms: 30_000,
        backoff_multiplier: default_multiplier(),
    }
}

fn default_max_open_files() -> usize {
    4
}

fn default_max_inflight_redactions() -> usize {
    16
}

fn default_channel_capacity() -> usize {
    256
}

impl DlpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl InputConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl WindowConfig {
    pub fn length(&self) -> Duration {
        Duration::from_secs(self.length_secs)
    }

    pub fn fire_delay(&self) -> Duration {
        Duration::from_millis(self.fire_delay_ms)
    }

    pub fn allowed_lateness(&self) -> Duration {
        Duration::from_secs(self.allowed_lateness_secs)
    }
}

impl OutputConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl RetrySection {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

impl Config {
    /// Load config from default location or create default if not found
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            Self::load_from(&path)
        } else {
            // Create default config file
            let config = Config::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, config.to_toml()?)?;
            Ok(config)
        }
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get config file path
    pub fn config_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("com", "dlp-stream", "dlp-stream") {
            dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("~/.dlp-stream/config.toml")
        }
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the effective configuration before a run starts
    pub fn validate(&self) -> anyhow::Result<()> {
        self.check(true)
    }

    /// Like [`Config::validate`], without requiring the remote `[dlp]` settings
    pub fn validate_offline(&self) -> anyhow::Result<()> {
        self.check(false)
    }

    fn check(&self, require_dlp: bool) -> anyhow::Result<()> {
        let mut required = vec![
            ("input.bucket_url", &self.input.bucket_url),
            ("output.path", &self.output.path),
        ];
        if require_dlp {
            required.splice(
                0..0,
                [
                    ("dlp.project", &self.dlp.project),
                    ("dlp.deidentify_template", &self.dlp.deidentify_template),
                    ("dlp.inspect_template", &self.dlp.inspect_template),
                ],
            );
        }

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            anyhow::bail!("Missing required settings: {}", missing.join(", "));
        }

        if self.input.batch_size == 0 {
            anyhow::bail!("input.batch_size must be greater than zero");
        }

        if self.window.length_secs == 0 {
            anyhow::bail!("window.length_secs must be greater than zero");
        }

        if self.dlp.timeout_secs == 0 {
            anyhow::bail!("dlp.timeout_secs must be greater than zero");
        }

        if self.output.write_timeout_secs == 0 {
            anyhow::bail!("output.write_timeout_secs must be greater than zero");
        }

        if self.concurrency.max_open_files == 0
            || self.concurrency.max_inflight_redactions == 0
            || self.concurrency.channel_capacity == 0
        {
            anyhow::bail!("concurrency limits must be greater than zero");
        }

        Ok(())
    }
}
