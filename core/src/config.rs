//! ServiceDesk configuration loading
//!
//! Loads configuration from `~/.config/servicedesk/servicedesk.toml` (or the
//! `SERVICEDESK_CONFIG` env var). Every key is optional.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::codec::CompressionProfile;
use crate::errors::ConfigError;

/// Root configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceDeskConfig {
    /// Directory holding the database and the legacy key/value file
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub photos: PhotoConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub codec: CodecConfig,
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|d| d.join("servicedesk").to_string_lossy().into_owned())
        .unwrap_or_else(|| "servicedesk-data".to_string())
}

/// Storage media settings
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// SQLite file for the primary medium
    #[serde(default = "default_db_filename")]
    pub db_filename: String,

    /// Flat key/value file for the legacy medium
    #[serde(default = "default_legacy_filename")]
    pub legacy_filename: String,

    /// Byte quota for the legacy medium
    #[serde(default = "default_legacy_quota_bytes")]
    pub legacy_quota_bytes: u64,

    /// Optional cap on the primary database size
    #[serde(default)]
    pub max_db_bytes: Option<u64>,
}

fn default_db_filename() -> String {
    "servicedesk.db".to_string()
}
fn default_legacy_filename() -> String {
    "local-storage.json".to_string()
}
fn default_legacy_quota_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_filename: default_db_filename(),
            legacy_filename: default_legacy_filename(),
            legacy_quota_bytes: default_legacy_quota_bytes(),
            max_db_bytes: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PhotoConfig {
    /// Upper bound on photos attached to one case
    #[serde(default = "default_max_per_case")]
    pub max_per_case: usize,
}

fn default_max_per_case() -> usize {
    crate::MAX_PHOTOS_PER_CASE
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            max_per_case: default_max_per_case(),
        }
    }
}

/// Background archival of photos on long-closed cases
#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_enabled")]
    pub enabled: bool,

    /// Days a closed case must sit untouched before its photos are archived
    #[serde(default = "default_after_days")]
    pub after_days: i64,

    /// Periodic re-check interval, on top of state-change triggers
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_archive_enabled() -> bool {
    true
}
fn default_after_days() -> i64 {
    crate::ARCHIVE_AFTER_DAYS
}
fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: default_archive_enabled(),
            after_days: default_after_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CodecConfig {
    #[serde(default = "CompressionProfile::capture")]
    pub capture: CompressionProfile,

    #[serde(default = "CompressionProfile::archive")]
    pub archive: CompressionProfile,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            capture: CompressionProfile::capture(),
            archive: CompressionProfile::archive(),
        }
    }
}

impl Default for ServiceDeskConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage: StorageConfig::default(),
            photos: PhotoConfig::default(),
            archive: ArchiveConfig::default(),
            codec: CodecConfig::default(),
        }
    }
}

impl ServiceDeskConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "SERVICEDESK_CONFIG";

    /// Default config filename
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "servicedesk.toml";

    /// Load configuration
    ///
    /// Resolution order:
    /// 1. `SERVICEDESK_CONFIG` environment variable
    /// 2. `~/.config/servicedesk/servicedesk.toml`
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::resolve_config_path();

        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "ServiceDesk config not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::with_source(format!("failed to read config at {}", path.display()), e)
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let cfg: ServiceDeskConfig = toml::from_str(contents)
            .map_err(|e| ConfigError::with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("servicedesk")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.photos.max_per_case == 0 {
            return Err(ConfigError::new("photos.max_per_case must be at least 1"));
        }

        for (name, profile) in [("capture", &self.codec.capture), ("archive", &self.codec.archive)]
        {
            let quality = profile.initial_quality;
            if !quality.is_finite() || quality <= 0.0 || quality > 1.0 {
                return Err(ConfigError::new(format!(
                    "codec.{name}.initial_quality must be in (0, 1]"
                )));
            }
            let floor = profile.min_quality;
            if !floor.is_finite() || floor <= 0.0 || floor > quality {
                return Err(ConfigError::new(format!(
                    "codec.{name}.min_quality must be in (0, initial_quality]"
                )));
            }
            if profile.max_width == 0 || profile.max_height == 0 {
                return Err(ConfigError::new(format!(
                    "codec.{name} dimensions must be non-zero"
                )));
            }
        }

        if self.codec.archive.max_size_kb > self.codec.capture.max_size_kb {
            tracing::warn!(
                archive_kb = self.codec.archive.max_size_kb,
                capture_kb = self.codec.capture.max_size_kb,
                "archive size cap is larger than capture cap; archival will not reclaim space"
            );
        }

        if self.archive.after_days < 0 {
            return Err(ConfigError::new("archive.after_days must not be negative"));
        }

        Ok(())
    }

    /// Data directory with `~/` expanded
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(stripped) = self.data_dir.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(stripped);
        }
        PathBuf::from(&self.data_dir)
    }

    pub fn db_path(&self) -> PathBuf {
        self.resolved_data_dir().join(&self.storage.db_filename)
    }

    pub fn legacy_path(&self) -> PathBuf {
        self.resolved_data_dir().join(&self.storage.legacy_filename)
    }

    pub fn archive_after(&self) -> chrono::Duration {
        chrono::Duration::days(self.archive.after_days)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.archive.sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let cfg = ServiceDeskConfig::default();
        assert_eq!(cfg.photos.max_per_case, 25);
        assert_eq!(cfg.archive.after_days, 15);
        assert!(cfg.archive.enabled);
        assert_eq!(cfg.storage.legacy_quota_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.codec.capture, CompressionProfile::capture());
    }

    #[test]
    fn test_parse_minimal_config() {
        let cfg = ServiceDeskConfig::parse(r#"data_dir = "/tmp/desk""#).expect("should parse");
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/desk/servicedesk.db"));
        assert_eq!(cfg.legacy_path(), PathBuf::from("/tmp/desk/local-storage.json"));
        assert_eq!(cfg.photos.max_per_case, 25);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            data_dir = "/var/lib/desk"

            [storage]
            db_filename = "cases.db"
            legacy_filename = "legacy.json"
            legacy_quota_bytes = 1024
            max_db_bytes = 1048576

            [photos]
            max_per_case = 10

            [archive]
            enabled = false
            after_days = 30
            sweep_interval_secs = 60

            [codec.capture]
            max_width = 1024
            max_height = 768
            initial_quality = 0.8
            max_size_kb = 200

            [codec.archive]
            max_width = 320
            max_height = 320
            initial_quality = 0.4
            max_size_kb = 20
            min_quality = 0.2
        "#;

        let cfg = ServiceDeskConfig::parse(toml).expect("should parse");
        assert_eq!(cfg.storage.max_db_bytes, Some(1_048_576));
        assert_eq!(cfg.photos.max_per_case, 10);
        assert!(!cfg.archive.enabled);
        assert_eq!(cfg.archive_after(), chrono::Duration::days(30));
        assert_eq!(cfg.codec.capture.max_width, 1024);
        assert_eq!(cfg.codec.capture.min_quality, 0.3);
        assert_eq!(cfg.codec.archive.min_quality, 0.2);
    }

    #[test]
    fn test_zero_photo_cap_rejected() {
        let err = ServiceDeskConfig::parse("[photos]\nmax_per_case = 0").unwrap_err();
        assert!(err.to_string().contains("max_per_case"));
    }

    #[test]
    fn test_bad_quality_rejected() {
        let toml = r#"
            [codec.capture]
            max_width = 800
            max_height = 800
            initial_quality = 1.5
            max_size_kb = 150
        "#;
        assert!(ServiceDeskConfig::parse(toml).is_err());
    }

    #[test]
    fn test_quality_floor_must_be_finite_and_below_start() {
        let profile = |initial: &str, floor: &str| {
            format!(
                "[codec.archive]\nmax_width = 480\nmax_height = 480\n\
                 initial_quality = {initial}\nmax_size_kb = 40\nmin_quality = {floor}"
            )
        };

        let err = ServiceDeskConfig::parse(&profile("0.5", "nan")).unwrap_err();
        assert!(err.to_string().contains("codec.archive.min_quality"));
        assert!(ServiceDeskConfig::parse(&profile("0.5", "0.9")).is_err());
        assert!(ServiceDeskConfig::parse(&profile("0.5", "0")).is_err());
        assert!(ServiceDeskConfig::parse(&profile("nan", "0.3")).is_err());
        assert!(ServiceDeskConfig::parse(&profile("0.5", "0.5")).is_ok());
    }
}
