//! Runtime tuning configuration.
//!
//! This is not the user's color settings (see `settings`); it holds the
//! timing knobs the engines use for debouncing, polling and throttling.
//! The embedded `colorkit.toml` is the base, a user file deep-merges over it.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use toml::Table;

use crate::color::is_valid_hex;
use crate::error::{Error, Result};

/// Embedded default configuration TOML, compiled into the binary.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../../colorkit.toml");

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Path where config was found, if any.
    pub source: Option<PathBuf>,
    /// Whether defaults were used (no config file found).
    pub used_defaults: bool,
}

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub day_coloring: DayColoringTiming,
    pub tasks: TaskTiming,
    pub time_blocks: TimeBlockTiming,
    pub registry: RegistryTiming,
}

/// Day-column engine timings (milliseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DayColoringTiming {
    pub debounce_ms: u64,
    pub view_change_debounce_ms: u64,
    pub href_poll_ms: u64,
    pub ready_poll_ms: u64,
    pub ready_timeout_ms: u64,
    pub verify_delay_ms: u64,
    pub day_fallback_ms: u64,
}

impl Default for DayColoringTiming {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            view_change_debounce_ms: 300,
            href_poll_ms: 500,
            ready_poll_ms: 100,
            ready_timeout_ms: 5000,
            verify_delay_ms: 150,
            day_fallback_ms: 2000,
        }
    }
}

/// Task chip engine timings and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskTiming {
    pub cache_ttl_ms: u64,
    pub min_repaint_interval_ms: u64,
    pub max_repaint_interval_ms: u64,
    pub burst_cap: u32,
    pub quiet_reset_ms: u64,
    pub navigation_burst: u32,
    pub navigation_delays_ms: Vec<u64>,
    pub injection_max_attempts: u32,
    pub injection_base_delay_ms: u64,
    pub editor_open_window_ms: u64,
    pub neutral_color: String,
}

impl Default for TaskTiming {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 1000,
            min_repaint_interval_ms: 25,
            max_repaint_interval_ms: 100,
            burst_cap: 12,
            quiet_reset_ms: 1000,
            navigation_burst: 3,
            navigation_delays_ms: vec![50, 150, 300, 600, 1000],
            injection_max_attempts: 30,
            injection_base_delay_ms: 50,
            editor_open_window_ms: 1500,
            neutral_color: "#4285f4".to_string(),
        }
    }
}

/// Time block overlay timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeBlockTiming {
    pub debounce_ms: u64,
}

impl Default for TimeBlockTiming {
    fn default() -> Self {
        Self { debounce_ms: 150 }
    }
}

/// Feature registry boot behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryTiming {
    pub boot_retry_ms: u64,
}

impl Default for RegistryTiming {
    fn default() -> Self {
        Self { boot_retry_ms: 500 }
    }
}

impl Config {
    /// Load configuration from the embedded default TOML string.
    pub fn from_default_toml() -> Result<Self> {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TOML)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, merging with embedded defaults.
    ///
    /// Returns an error if the file doesn't exist or can't be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::load_with_defaults(&content)
    }

    /// Parse a user TOML string and deep-merge it over the embedded defaults.
    pub fn load_with_defaults(user_toml: &str) -> Result<Self> {
        let mut base: Table = toml::from_str(DEFAULT_CONFIG_TOML)?;
        let user: Table = toml::from_str(user_toml)?;

        deep_merge_toml(&mut base, user);

        let config: Config = base.try_into()?;
        Ok(config)
    }

    /// Find and load configuration using the XDG lookup chain.
    ///
    /// An explicit path is used strictly. Otherwise searches:
    /// 1. `$XDG_CONFIG_HOME/colorkit/colorkit.toml`
    /// 2. `~/.config/colorkit/colorkit.toml`
    /// 3. `./colorkit.toml`
    ///
    /// A file that exists but fails to load is an error; defaults are used
    /// only when no file exists at all.
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<ConfigLoadResult> {
        if let Some(path) = explicit_path {
            let config = Self::load(path)?;
            return Ok(ConfigLoadResult {
                config,
                source: Some(path.to_path_buf()),
                used_defaults: false,
            });
        }

        let search_paths = Self::config_search_paths();
        for path in &search_paths {
            if path.exists() {
                return match Self::load(path) {
                    Ok(config) => Ok(ConfigLoadResult {
                        config,
                        source: Some(path.clone()),
                        used_defaults: false,
                    }),
                    Err(error) => {
                        tracing::error!(
                            "Config file {:?} exists but failed to load: {}",
                            path,
                            error
                        );
                        Err(error)
                    }
                };
            }
        }

        tracing::info!("No config file found, using built-in default config");
        tracing::debug!(
            "Searched: {}",
            search_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(ConfigLoadResult {
            config: Self::from_default_toml()?,
            source: None,
            used_defaults: true,
        })
    }

    /// Get the list of paths to search for config files.
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg_config).join("colorkit/colorkit.toml"));
        }

        if let Ok(home) = env::var("HOME") {
            paths.push(PathBuf::from(home).join(".config/colorkit/colorkit.toml"));
        }

        paths.push(PathBuf::from("colorkit.toml"));

        paths
    }

    /// Validate the configuration, returning errors for invalid values.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        let day = &self.day_coloring;
        for (name, value) in [
            ("day_coloring.debounce_ms", day.debounce_ms),
            ("day_coloring.href_poll_ms", day.href_poll_ms),
            ("day_coloring.ready_poll_ms", day.ready_poll_ms),
            ("day_coloring.day_fallback_ms", day.day_fallback_ms),
        ] {
            if value == 0 {
                errors.push(format!("{name}: must be greater than 0"));
            }
        }
        if day.ready_timeout_ms < day.ready_poll_ms {
            errors.push(format!(
                "day_coloring.ready_timeout_ms: {} is shorter than ready_poll_ms ({})",
                day.ready_timeout_ms, day.ready_poll_ms
            ));
        }

        let tasks = &self.tasks;
        if tasks.min_repaint_interval_ms > tasks.max_repaint_interval_ms {
            errors.push(format!(
                "tasks.min_repaint_interval_ms: {} exceeds max_repaint_interval_ms ({})",
                tasks.min_repaint_interval_ms, tasks.max_repaint_interval_ms
            ));
        }
        if tasks.burst_cap == 0 {
            errors.push("tasks.burst_cap: must be greater than 0".to_string());
        }
        if tasks.injection_max_attempts == 0 {
            errors.push("tasks.injection_max_attempts: must be greater than 0".to_string());
        }
        if !is_valid_hex(&tasks.neutral_color) {
            errors.push(format!(
                "tasks.neutral_color: invalid value '{}', expected a hex color like '#4285f4'",
                tasks.neutral_color
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::ConfigValidation(errors))
        }
    }

    /// Human-readable summary of the configuration.
    pub fn summary(&self) -> String {
        let day = &self.day_coloring;
        let tasks = &self.tasks;
        [
            "Day coloring:".to_string(),
            format!(
                "  debounce: {}ms ({}ms on view change)",
                day.debounce_ms, day.view_change_debounce_ms
            ),
            format!("  href poll: {}ms", day.href_poll_ms),
            format!(
                "  ready wait: every {}ms up to {}ms",
                day.ready_poll_ms, day.ready_timeout_ms
            ),
            "Tasks:".to_string(),
            format!(
                "  repaint interval: {}-{}ms, burst cap {}",
                tasks.min_repaint_interval_ms, tasks.max_repaint_interval_ms, tasks.burst_cap
            ),
            format!("  neutral color: {}", tasks.neutral_color),
            "Time blocks:".to_string(),
            format!("  debounce: {}ms", self.time_blocks.debounce_ms),
        ]
        .join("\n")
    }
}

/// Deep merge two TOML tables, with `overlay` values taking precedence.
///
/// For nested tables, recursively merges. For arrays and other values,
/// the overlay value completely replaces the base value.
fn deep_merge_toml(base: &mut Table, overlay: Table) {
    for (key, overlay_value) in overlay {
        match (base.get_mut(&key), overlay_value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                deep_merge_toml(base_table, overlay_table);
            }
            (_, overlay_value) => {
                base.insert(key, overlay_value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_matches_struct_defaults() {
        let from_toml = Config::from_default_toml().expect("embedded default config should parse");
        assert_eq!(from_toml, Config::default());
        assert!(from_toml.validate().is_ok());
    }

    #[test]
    fn test_load_with_defaults_merges_sections() {
        let config = Config::load_with_defaults(
            r#"
            [tasks]
            burst_cap = 4
            navigation_delays_ms = [10]
            "#,
        )
        .unwrap();

        assert_eq!(config.tasks.burst_cap, 4);
        assert_eq!(config.tasks.navigation_delays_ms, vec![10]);
        // Untouched keys keep their defaults.
        assert_eq!(config.tasks.cache_ttl_ms, 1000);
        assert_eq!(config.day_coloring.debounce_ms, 100);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result = Config::load_with_defaults("[day_coloring]\ndebounce = 5\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_reports_all_problems() {
        let mut config = Config::default();
        config.day_coloring.debounce_ms = 0;
        config.tasks.min_repaint_interval_ms = 500;
        config.tasks.neutral_color = "blue".to_string();

        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("day_coloring.debounce_ms"));
        assert!(msg.contains("tasks.min_repaint_interval_ms"));
        assert!(msg.contains("tasks.neutral_color"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/colorkit.toml"));
        assert!(matches!(result, Err(Error::ConfigNotFound(_))));
    }

    #[test]
    fn test_deep_merge_toml_replaces_arrays() {
        let mut base: Table = toml::from_str("a = [1, 2]\n[t]\nx = 1\ny = 2\n").unwrap();
        let overlay: Table = toml::from_str("a = [3]\n[t]\ny = 5\n").unwrap();
        deep_merge_toml(&mut base, overlay);
        assert_eq!(base["a"].as_array().unwrap().len(), 1);
        assert_eq!(base["t"]["x"].as_integer(), Some(1));
        assert_eq!(base["t"]["y"].as_integer(), Some(5));
    }
}
