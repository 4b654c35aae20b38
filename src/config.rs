//! Configuration loaded from TOML
//!
//! Lookup order: an explicit path, then `MOUNT_LINKER_CONFIG`, then
//! `config.toml` in the platform config directory. A missing file means
//! defaults for everything; a file only needs the keys it overrides.

use crate::matcher::MatchThresholds;
use crate::scanner::{FallbackPolicy, ScanOptions};
use crate::watcher::WatchSettings;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable pointing at a config file
pub const CONFIG_ENV: &str = "MOUNT_LINKER_CONFIG";

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub invalidation: InvalidationConfig,
    #[serde(default)]
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Remote mount watched for new files
    #[serde(default = "default_mount_root")]
    pub mount_root: PathBuf,
    /// Root of the `Movies/` + `Shows/` tree
    #[serde(default = "default_library_root")]
    pub library_root: PathBuf,
    /// Where `active_jobs.json` lives; platform data dir when unset
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            mount_root: default_mount_root(),
            library_root: default_library_root(),
            state_dir: None,
        }
    }
}

fn default_mount_root() -> PathBuf {
    PathBuf::from("/mnt/torbox")
}

fn default_library_root() -> PathBuf {
    PathBuf::from("/Media")
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_pause_interval_secs")]
    pub pause_interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Folder depth of the exact-name and episode-token scans
    #[serde(default = "default_root_exact_depth")]
    pub root_exact_depth: usize,
    /// Folder depth searched inside folders accepted by the scorer
    #[serde(default = "default_fallback_depth")]
    pub fallback_depth: usize,
    #[serde(default)]
    pub trust_expected_filename: FallbackPolicy,
    #[serde(default = "default_completed_eviction_secs")]
    pub completed_eviction_secs: u64,
    #[serde(default = "default_cancelled_eviction_secs")]
    pub cancelled_eviction_secs: u64,
    /// Lines kept per job log
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            pause_interval_secs: default_pause_interval_secs(),
            timeout_secs: default_timeout_secs(),
            root_exact_depth: default_root_exact_depth(),
            fallback_depth: default_fallback_depth(),
            trust_expected_filename: FallbackPolicy::default(),
            completed_eviction_secs: default_completed_eviction_secs(),
            cancelled_eviction_secs: default_cancelled_eviction_secs(),
            log_capacity: default_log_capacity(),
        }
    }
}

impl WatchConfig {
    pub fn settings(&self) -> WatchSettings {
        WatchSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            pause_interval: Duration::from_secs(self.pause_interval_secs),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            root_exact_depth: self.root_exact_depth,
            fallback_depth: self.fallback_depth,
            fallback: self.trust_expected_filename,
        }
    }

    pub fn completed_eviction(&self) -> Duration {
        Duration::from_secs(self.completed_eviction_secs)
    }

    pub fn cancelled_eviction(&self) -> Duration {
        Duration::from_secs(self.cancelled_eviction_secs)
    }
}

fn default_poll_interval_secs() -> u64 {
    10
}
fn default_pause_interval_secs() -> u64 {
    5
}
fn default_timeout_secs() -> u64 {
    3600
}
fn default_root_exact_depth() -> usize {
    3
}
fn default_fallback_depth() -> usize {
    2
}
fn default_completed_eviction_secs() -> u64 {
    60
}
fn default_cancelled_eviction_secs() -> u64 {
    2
}
fn default_log_capacity() -> usize {
    500
}

/// Scorer tuning; the defaults are empirical
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: u8,
    #[serde(default = "default_sub_file_threshold")]
    pub sub_file_threshold: u8,
    #[serde(default = "default_short_title_len")]
    pub short_title_len: usize,
    #[serde(default = "default_strong_overlap_ratio")]
    pub strong_overlap_ratio: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            accept_threshold: default_accept_threshold(),
            sub_file_threshold: default_sub_file_threshold(),
            short_title_len: default_short_title_len(),
            strong_overlap_ratio: default_strong_overlap_ratio(),
        }
    }
}

impl MatchingConfig {
    pub fn thresholds(&self) -> MatchThresholds {
        MatchThresholds {
            accept: self.accept_threshold,
            sub_file: self.sub_file_threshold,
            short_title_len: self.short_title_len,
            strong_overlap: self.strong_overlap_ratio,
        }
    }
}

fn default_accept_threshold() -> u8 {
    35
}
fn default_sub_file_threshold() -> u8 {
    30
}
fn default_short_title_len() -> usize {
    4
}
fn default_strong_overlap_ratio() -> f64 {
    0.7
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvalidationConfig {
    /// Program and arguments; an empty list disables invalidation
    #[serde(default = "default_invalidation_command")]
    pub command: Vec<String>,
    #[serde(default = "default_invalidation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        Self {
            command: default_invalidation_command(),
            timeout_secs: default_invalidation_timeout_secs(),
        }
    }
}

impl InvalidationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_invalidation_command() -> Vec<String> {
    vec!["rclone".into(), "rc".into(), "vfs/forget".into()]
}

fn default_invalidation_timeout_secs() -> u64 {
    3
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryConfig {
    /// Name folders after the original title instead of the display title
    #[serde(default)]
    pub use_original_title: bool,
    /// Marker of the bracketed catalog id token, e.g. `{tmdb-1399}`
    #[serde(default = "default_catalog_marker")]
    pub catalog_marker: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            use_original_title: false,
            catalog_marker: default_catalog_marker(),
        }
    }
}

fn default_catalog_marker() -> String {
    "tmdb".to_string()
}

impl Config {
    /// Loads the configuration following the lookup order
    ///
    /// An explicitly given path must exist; the other locations are optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }

        match default_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content).map_err(|e| match e {
            ParseError::Toml(source) => ConfigError::ParseFailed {
                path: path.to_path_buf(),
                source,
            },
            ParseError::Invalid(reason) => ConfigError::Invalid(reason),
        })
    }

    fn parse(content: &str) -> Result<Self, ParseError> {
        let config: Config = toml::from_str(content).map_err(ParseError::Toml)?;
        config.validate().map_err(ParseError::Invalid)?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.watch.poll_interval_secs == 0 || self.watch.pause_interval_secs == 0 {
            return Err("watch intervals must be at least one second".to_string());
        }
        if self.watch.log_capacity == 0 {
            return Err("watch.log_capacity must be positive".to_string());
        }
        if self.matching.accept_threshold > 100 || self.matching.sub_file_threshold > 100 {
            return Err("matching thresholds must be between 0 and 100".to_string());
        }
        if !(0.0..=1.0).contains(&self.matching.strong_overlap_ratio) {
            return Err("matching.strong_overlap_ratio must be between 0 and 1".to_string());
        }
        let marker = &self.library.catalog_marker;
        if marker.is_empty() || !marker.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!(
                "library.catalog_marker must be alphanumeric, got '{}'",
                marker
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
enum ParseError {
    Toml(toml::de::Error),
    Invalid(String),
}

/// `config.toml` in the platform config directory
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "mountlinker", "mount-linker")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
