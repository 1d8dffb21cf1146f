//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/gcscope/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/gcscope/` (~/.config/gcscope/)
//! - State/Logs: `$XDG_STATE_HOME/gcscope/` (~/.local/state/gcscope/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Parser configuration
    #[serde(default)]
    pub parser: ParserConfig,

    /// Fragmented-mode configuration
    #[serde(default)]
    pub fragment: FragmentConfig,

    /// Diagnoser thresholds
    #[serde(default)]
    pub diagnoser: DiagnoserConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Parser configuration
#[derive(Debug, Deserialize)]
pub struct ParserConfig {
    /// Number of leading non-empty lines examined when sniffing the format
    #[serde(default = "default_sniff_lines")]
    pub sniff_lines: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            sniff_lines: default_sniff_lines(),
        }
    }
}

fn default_sniff_lines() -> usize {
    200
}

/// Fragmented-mode configuration
#[derive(Debug, Deserialize)]
pub struct FragmentConfig {
    /// Width of the worker pool that parses line-groups
    #[serde(default = "default_fragment_workers")]
    pub workers: usize,
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            workers: default_fragment_workers(),
        }
    }
}

fn default_fragment_workers() -> usize {
    4
}

/// Thresholds for the built-in diagnosis rules
#[derive(Debug, Deserialize, Clone)]
pub struct DiagnoserConfig {
    /// Pauses longer than this (ms) are reported
    #[serde(default = "default_long_pause_ms")]
    pub long_pause_ms: f64,

    /// Consecutive metaspace-triggered full GCs needed to report
    #[serde(default = "default_metaspace_full_gc_run")]
    pub metaspace_full_gc_run: usize,

    /// Minimum occurrences of a special situation before it is reported
    #[serde(default = "default_special_situation_min_count")]
    pub special_situation_min_count: usize,

    /// Pause percentage of wall-clock time considered excessive
    #[serde(default = "default_high_overhead_percent")]
    pub high_overhead_percent: f64,

    /// Young capacity shrink ratio (new / old) that counts as a sudden shrink
    #[serde(default = "default_heap_shrink_ratio")]
    pub heap_shrink_ratio: f64,

    /// Minimum run of cycle/young alternations reported as restarts
    #[serde(default = "default_cycle_restart_min_run")]
    pub cycle_restart_min_run: usize,

    /// Rules that should not run
    #[serde(default)]
    pub disabled_rules: Vec<String>,
}

impl Default for DiagnoserConfig {
    fn default() -> Self {
        Self {
            long_pause_ms: default_long_pause_ms(),
            metaspace_full_gc_run: default_metaspace_full_gc_run(),
            special_situation_min_count: default_special_situation_min_count(),
            high_overhead_percent: default_high_overhead_percent(),
            heap_shrink_ratio: default_heap_shrink_ratio(),
            cycle_restart_min_run: default_cycle_restart_min_run(),
            disabled_rules: vec![],
        }
    }
}

fn default_long_pause_ms() -> f64 {
    1000.0
}

fn default_metaspace_full_gc_run() -> usize {
    3
}

fn default_special_situation_min_count() -> usize {
    1
}

fn default_high_overhead_percent() -> f64 {
    10.0
}

fn default_heap_shrink_ratio() -> f64 {
    0.5
}

fn default_cycle_restart_min_run() -> usize {
    3
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.fragment.workers == 0 {
            return Err(Error::Config(
                "fragment.workers must be at least 1".to_string(),
            ));
        }
        if self.parser.sniff_lines == 0 {
            return Err(Error::Config(
                "parser.sniff_lines must be at least 1".to_string(),
            ));
        }
        let ratio = self.diagnoser.heap_shrink_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(Error::Config(
                "diagnoser.heap_shrink_ratio must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/gcscope/config.toml` (~/.config/gcscope/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("gcscope").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/gcscope/` (~/.local/state/gcscope/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("gcscope")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.parser.sniff_lines, 200);
        assert_eq!(config.fragment.workers, 4);
        assert_eq!(config.diagnoser.metaspace_full_gc_run, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[logging]
level = "debug"

[fragment]
workers = 8

[diagnoser]
long_pause_ms = 250.0
disabled_rules = ["explicit_gc"]
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.fragment.workers, 8);
        assert_eq!(config.diagnoser.long_pause_ms, 250.0);
        assert_eq!(config.diagnoser.disabled_rules, vec!["explicit_gc"]);
        // untouched sections keep defaults
        assert_eq!(config.parser.sniff_lines, 200);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = Config {
            fragment: FragmentConfig { workers: 0 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[parser]\nsniff_lines = 50").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.parser.sniff_lines, 50);
    }

    #[test]
    fn test_load_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[diagnoser]\nheap_shrink_ratio = 1.5").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
