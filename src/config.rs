// Application configuration
//
// TOML backed settings for download policies and shell timings.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file: {path}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file: {path}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize to TOML: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Configuration validation failed:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

/// Top level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub downloads: DownloadThresholds,
    #[serde(default)]
    pub shell: ShellConfig,
}

/// Size limits that decide when a file is fetched without asking
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownloadThresholds {
    /// Files up to this size (bytes) download without confirmation on any network
    #[serde(default = "default_download_threshold")]
    pub download_threshold: u64,
    /// Files up to this size (bytes) download without confirmation on wifi
    #[serde(default = "default_wifi_download_threshold")]
    pub wifi_download_threshold: u64,
}

/// Timings used by the application shell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Repeated launches of the same URL inside this window are ignored
    #[serde(default = "default_url_dedup_window_ms")]
    pub url_dedup_window_ms: u64,
    /// Wait before deciding that back navigation did not happen
    #[serde(default = "default_back_button_grace_ms")]
    pub back_button_grace_ms: u64,
    /// Wait after resume before checking a pending browser login
    #[serde(default = "default_resume_grace_ms")]
    pub resume_grace_ms: u64,
    /// How long the "back online" notice stays visible
    #[serde(default = "default_online_notice_ms")]
    pub online_notice_ms: u64,
}

fn default_download_threshold() -> u64 { 10 * 1024 * 1024 }
fn default_wifi_download_threshold() -> u64 { 100 * 1024 * 1024 }
fn default_url_dedup_window_ms() -> u64 { 3000 }
fn default_back_button_grace_ms() -> u64 { 50 }
fn default_resume_grace_ms() -> u64 { 1000 }
fn default_online_notice_ms() -> u64 { 3000 }

impl Default for DownloadThresholds {
    fn default() -> Self {
        Self {
            download_threshold: default_download_threshold(),
            wifi_download_threshold: default_wifi_download_threshold(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            url_dedup_window_ms: default_url_dedup_window_ms(),
            back_button_grace_ms: default_back_button_grace_ms(),
            resume_grace_ms: default_resume_grace_ms(),
            online_notice_ms: default_online_notice_ms(),
        }
    }
}

impl DownloadThresholds {
    /// Whether a file of `size` bytes can be fetched without user action
    pub fn should_auto_download(&self, size: u64, wifi: bool) -> bool {
        size > 0
            && (size <= self.download_threshold || (wifi && size <= self.wifi_download_threshold))
    }

    /// Whether the user must confirm a transfer of `size` bytes.
    ///
    /// `total` tells whether the size is the real total or only a partial,
    /// possibly zero, estimate.
    pub fn needs_confirmation(&self, size: u64, total: bool, wifi: bool) -> bool {
        if size == 0 && !total {
            return true;
        }

        size >= self.wifi_download_threshold || (!wifi && size >= self.download_threshold)
    }
}

impl ShellConfig {
    pub fn url_dedup_window(&self) -> Duration {
        Duration::from_millis(self.url_dedup_window_ms)
    }

    pub fn back_button_grace(&self) -> Duration {
        Duration::from_millis(self.back_button_grace_ms)
    }

    pub fn resume_grace(&self) -> Duration {
        Duration::from_millis(self.resume_grace_ms)
    }

    pub fn online_notice(&self) -> Duration {
        Duration::from_millis(self.online_notice_ms)
    }
}

/// Outcome of [`AppConfig::validate`]
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl AppConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize configuration to a TOML string
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_toml_str(&content)?;
        let validation = config.validate();
        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.errors));
        }

        for warning in &validation.warnings {
            log::warn!("Configuration warning: {}", warning);
        }

        Ok(config)
    }

    /// Load configuration from `path` (or the default location) and fall back
    /// to defaults when the file does not exist
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };

        if !path.exists() {
            log::debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load(&path)
    }

    /// Write configuration to a file, creating parent directories
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = self.to_toml_string()?;
        fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check value consistency
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.downloads.download_threshold == 0 {
            result
                .errors
                .push("downloads.download_threshold must be greater than 0".to_string());
        }

        if self.downloads.wifi_download_threshold < self.downloads.download_threshold {
            result.errors.push(
                "downloads.wifi_download_threshold must not be lower than downloads.download_threshold"
                    .to_string(),
            );
        }

        if self.shell.url_dedup_window_ms == 0 {
            result
                .warnings
                .push("shell.url_dedup_window_ms is 0, repeated URL launches will not be filtered".to_string());
        }

        if self.shell.back_button_grace_ms > 1000 {
            result
                .warnings
                .push("shell.back_button_grace_ms above 1000 makes the back button feel unresponsive".to_string());
        }

        result
    }
}

/// Get default configuration file path
pub fn default_config_path() -> ConfigResult<PathBuf> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;

    Ok(config_dir.join("moodleapp").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = AppConfig::from_toml_str("[downloads]\ndownload_threshold = 5000\n").unwrap();

        assert_eq!(config.downloads.download_threshold, 5000);
        assert_eq!(config.downloads.wifi_download_threshold, 100 * 1024 * 1024);
        assert_eq!(config.shell, ShellConfig::default());
    }

    #[test]
    fn test_auto_download_policy() {
        let thresholds = DownloadThresholds {
            download_threshold: 5000,
            wifi_download_threshold: 50_000,
        };

        assert!(thresholds.should_auto_download(1000, false));
        assert!(thresholds.should_auto_download(5000, false));
        assert!(!thresholds.should_auto_download(6000, false));
        assert!(thresholds.should_auto_download(6000, true));
        assert!(!thresholds.should_auto_download(60_000, true));
        assert!(!thresholds.should_auto_download(0, true));
    }

    #[test]
    fn test_confirmation_policy() {
        let thresholds = DownloadThresholds {
            download_threshold: 5000,
            wifi_download_threshold: 50_000,
        };

        assert!(thresholds.needs_confirmation(0, false, true));
        assert!(!thresholds.needs_confirmation(0, true, false));
        assert!(!thresholds.needs_confirmation(1000, true, false));
        assert!(thresholds.needs_confirmation(5000, true, false));
        assert!(!thresholds.needs_confirmation(5000, true, true));
        assert!(thresholds.needs_confirmation(50_000, true, true));
    }

    #[test]
    fn test_validation_rejects_inverted_thresholds() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_valid());

        config.downloads.wifi_download_threshold = 1;
        let validation = config.validate();
        assert!(!validation.is_valid());
        assert_eq!(validation.errors.len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.shell.back_button_grace_ms = 80;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        let config = AppConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[downloads]\ndownload_threshold = 0\n").unwrap();

        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Invalid(_))));
    }
}
