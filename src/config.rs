//! Configuration management
//!
//! Database, learning, posting and platform settings, read from a TOML file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::platform::Visibility;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Visibility of autonomous posts and rotation notices
    #[serde(default)]
    pub visibility: Visibility,
    /// Post generated text on a timer
    #[serde(default)]
    pub interval_post: bool,
    /// Period of the interval post
    #[serde(default)]
    pub interval_post_duration: PostDuration,
    /// Inclusive range of sentences per generation (1 when unset)
    #[serde(default)]
    pub sentence_length_range: Option<LengthRange>,
    /// Operator user ids (`username` or `username@host`)
    #[serde(default)]
    pub op: Vec<String>,
    /// Blocked user ids
    #[serde(default)]
    pub blocked: Vec<String>,
    /// Chain database settings
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Learning policy
    #[serde(default)]
    pub markov_speaking: SpeakingConfig,
    /// Platform API endpoint
    #[serde(default)]
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database implementation
    #[serde(rename = "type", default = "default_database_type")]
    pub kind: String,
    /// JSON file holding the chain state
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    /// Rotate once the file reaches this many bytes (0 disables rotation)
    #[serde(default)]
    pub max_size: u64,
    /// Observed notes per save
    #[serde(default = "default_save_frequency")]
    pub save_frequency: u32,
    /// Multiplier applied to every count on rotation, in [0, 1)
    #[serde(default = "default_attenuation_rate")]
    pub attenuation_rate: f64,
}

fn default_database_type() -> String {
    "onlyOne".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("markov.json")
}

fn default_save_frequency() -> u32 {
    5
}

fn default_attenuation_rate() -> f64 {
    0.5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: default_database_type(),
            path: default_database_path(),
            max_size: 0,
            save_frequency: default_save_frequency(),
            attenuation_rate: default_attenuation_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakingConfig {
    /// Learn at all
    #[serde(default = "default_true")]
    pub allow_learn: bool,
    /// Learn from notes carrying a content warning
    #[serde(default = "default_true")]
    pub allow_learn_cw: bool,
    /// Learn from followers-only notes
    #[serde(default = "default_true")]
    pub allow_learn_vis_followers: bool,
    /// Local word filter files
    #[serde(default)]
    pub word_filter_files: Vec<PathBuf>,
    /// Remote word filter list (empty disables)
    #[serde(default)]
    pub word_filter_url: String,
}

fn default_true() -> bool {
    true
}

impl Default for SpeakingConfig {
    fn default() -> Self {
        Self {
            allow_learn: true,
            allow_learn_cw: true,
            allow_learn_vis_followers: true,
            word_filter_files: vec![],
            word_filter_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Instance base URL
    #[serde(default)]
    pub url: String,
    /// API access token
    #[serde(default)]
    pub token: String,
}

/// Inclusive sentence count range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRange {
    pub start: usize,
    pub end: usize,
}

/// Duration given as value + unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostDuration {
    pub value: f64,
    pub unit: DurationUnit,
}

impl Default for PostDuration {
    fn default() -> Self {
        Self {
            value: 1.0,
            unit: DurationUnit::Hours,
        }
    }
}

impl PostDuration {
    /// Length in milliseconds; may be zero or negative for bad settings
    pub fn as_millis(&self) -> f64 {
        self.value * self.unit.millis()
    }

    /// Positive period, or None when the setting is unusable
    pub fn period(&self) -> Option<Duration> {
        let millis = self.as_millis();
        if millis.is_finite() && millis >= 1.0 {
            Some(Duration::from_millis(millis as u64))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    #[serde(alias = "ms", alias = "millisecond")]
    Milliseconds,
    #[serde(alias = "s", alias = "second")]
    Seconds,
    #[serde(alias = "m", alias = "minute")]
    Minutes,
    #[serde(alias = "h", alias = "hour")]
    Hours,
    #[serde(alias = "d", alias = "day")]
    Days,
    #[serde(alias = "w", alias = "week")]
    Weeks,
    #[serde(alias = "M", alias = "month")]
    Months,
    #[serde(alias = "y", alias = "year")]
    Years,
}

impl DurationUnit {
    fn millis(self) -> f64 {
        const DAY: f64 = 86_400_000.0;
        match self {
            DurationUnit::Milliseconds => 1.0,
            DurationUnit::Seconds => 1_000.0,
            DurationUnit::Minutes => 60_000.0,
            DurationUnit::Hours => 3_600_000.0,
            DurationUnit::Days => DAY,
            DurationUnit::Weeks => 7.0 * DAY,
            // Gregorian averages
            DurationUnit::Months => 30.436875 * DAY,
            DurationUnit::Years => 365.2425 * DAY,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            visibility: Visibility::default(),
            interval_post: false,
            interval_post_duration: PostDuration::default(),
            sentence_length_range: None,
            op: vec![],
            blocked: vec![],
            database: DatabaseConfig::default(),
            markov_speaking: SpeakingConfig::default(),
            platform: PlatformConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from a file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::from_toml(&contents)?
        } else {
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config file")
    }

    /// Reject settings the database cannot work with
    pub fn validate(&self) -> Result<()> {
        let rate = self.database.attenuation_rate;
        if !(0.0..1.0).contains(&rate) {
            bail!("database.attenuation_rate must be in [0, 1), got {}", rate);
        }
        if self.database.save_frequency == 0 {
            bail!("database.save_frequency must be at least 1");
        }
        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "markov-speaking", "markov-speaking")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}
