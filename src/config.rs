//! Configuration management for the engine.
//!
//! Loads configuration from TOML files and provides runtime defaults. The
//! timing constants here are tuned empirically and carried as configuration,
//! not correctness invariants.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether the engine is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Package id of the host application itself. The bubble is never shown
    /// on top of our own UI.
    #[serde(default = "default_host_app")]
    pub host_app_id: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
            host_app_id: default_host_app(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Debounce applied to visibility evaluation after app-switch bursts
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Cadence of the fallback check while the primary event path is healthy
    #[serde(default = "default_fallback_interval")]
    pub fallback_interval_seconds: u64,

    /// If no primary event arrives within this window, the fallback check
    /// actually performs an OS query
    #[serde(default = "default_primary_timeout")]
    pub primary_timeout_seconds: u64,

    /// Polling cadence when the primary event path is not available at all
    #[serde(default = "default_sole_source_interval")]
    pub sole_source_interval_seconds: u64,

    /// How long to wait for a buffered frame before retrying once
    #[serde(default = "default_frame_wait_ms")]
    pub frame_wait_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            fallback_interval_seconds: 30,
            primary_timeout_seconds: 10,
            sole_source_interval_seconds: 5,
            frame_wait_ms: 100,
        }
    }
}

impl TimingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fallback_interval(&self) -> Duration {
        Duration::from_secs(self.fallback_interval_seconds)
    }

    pub fn primary_timeout(&self) -> Duration {
        Duration::from_secs(self.primary_timeout_seconds)
    }

    pub fn sole_source_interval(&self) -> Duration {
        Duration::from_secs(self.sole_source_interval_seconds)
    }

    pub fn frame_wait(&self) -> Duration {
        Duration::from_millis(self.frame_wait_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Package patterns that are never real foreground apps
    /// (system shell, launchers, notification surfaces)
    #[serde(default = "default_system_packages")]
    pub system_packages: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            system_packages: default_system_packages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Directory where captured frames are written. Defaults to the
    /// platform data dir when unset.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { output_dir: None }
    }
}

impl CaptureConfig {
    /// Resolve the frame output directory
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("screenguard")
                .join("captures")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum text length for inclusion
    #[serde(default = "default_min_text_len")]
    pub min_text_len: usize,

    /// Viewport insets excluding fixed chrome, in pixels
    #[serde(default = "default_side_inset")]
    pub viewport_side_inset: i32,

    /// Top inset (status bar + app bar)
    #[serde(default = "default_top_inset")]
    pub viewport_top_inset: i32,

    /// Bottom inset (navigation bar)
    #[serde(default = "default_bottom_inset")]
    pub viewport_bottom_inset: i32,

    /// Optional JSON file with extra junk keywords:
    /// `{"junkKeywords": ["ok", "cancel", ...]}`
    #[serde(default)]
    pub junk_keywords_path: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_len: 3,
            viewport_side_inset: 20,
            viewport_top_inset: 200,
            viewport_bottom_inset: 150,
            junk_keywords_path: None,
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host_app() -> String {
    "app.screenguard.mobile".to_string()
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_fallback_interval() -> u64 {
    30
}

fn default_primary_timeout() -> u64 {
    10
}

fn default_sole_source_interval() -> u64 {
    5
}

fn default_frame_wait_ms() -> u64 {
    100
}

fn default_min_text_len() -> usize {
    3
}

fn default_side_inset() -> i32 {
    20
}

fn default_top_inset() -> i32 {
    200
}

fn default_bottom_inset() -> i32 {
    150
}

fn default_system_packages() -> Vec<String> {
    vec![
        "com.android.systemui*".to_string(),
        "com.android.launcher*".to_string(),
        "*notification*".to_string(),
    ]
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("screenguard")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.general.enabled);
        assert_eq!(config.timing.debounce_ms, 300);
        assert_eq!(config.timing.fallback_interval_seconds, 30);
        assert_eq!(config.extraction.min_text_len, 3);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[general]
enabled = true
log_level = "debug"

[timing]
debounce_ms = 150
primary_timeout_seconds = 5

[extraction]
min_text_len = 4
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.timing.debounce_ms, 150);
        assert_eq!(config.timing.primary_timeout_seconds, 5);
        assert_eq!(config.extraction.min_text_len, 4);
        // Unset sections keep their defaults
        assert_eq!(config.timing.fallback_interval_seconds, 30);
    }

    #[test]
    fn test_system_packages_default() {
        let config = Config::default();
        assert!(config
            .monitor
            .system_packages
            .iter()
            .any(|p| p.contains("systemui")));
    }

    #[test]
    fn test_fallback_cadences_differ() {
        // The sole-source cadence addresses a different failure mode than the
        // primary-unhealthy detection cadence and must be tunable separately.
        let config = Config::default();
        assert!(config.timing.sole_source_interval() < config.timing.fallback_interval());
    }
}
