//! Configuration loader
//!
//! Reads `memclass.toml`. Absent sections and keys fall back to
//! [`super::defaults`].

use super::{defaults, ConfigResult};
use crate::process::AccessMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
///
/// Every section and field is optional in the file; missing ones take the
/// values from [`super::defaults`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub access: AccessConfig,
    pub scanner: ScannerConfig,
    pub memory: MemoryConfig,
    pub logging: LoggingConfig,
}

/// Which path reads and writes target memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub mode: AccessMode,
}

/// Scanner worker pool and chunking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub max_threads: usize,
    pub chunk_size: usize,
    pub fast_scan_alignment: usize,
}

/// Buffer limits, region cache and pointer expansion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_read_size: usize,
    pub cache_entries: usize,
    pub max_pointer_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        AccessConfig {
            mode: defaults::ACCESS_MODE,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            max_threads: defaults::scan_threads(),
            chunk_size: defaults::CHUNK_SIZE,
            fast_scan_alignment: defaults::FAST_SCAN_ALIGNMENT,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            max_read_size: defaults::MAX_READ_SIZE,
            cache_entries: defaults::CACHE_ENTRIES,
            max_pointer_depth: defaults::MAX_POINTER_DEPTH,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: defaults::LOG_LEVEL.to_string(),
        }
    }
}

/// Reads and writes one TOML configuration file
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        ConfigLoader {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Parses the file; a missing file is `FileNotFound`
    pub fn load(&self) -> ConfigResult<Config> {
        if !self.config_path.exists() {
            return Err(ConfigError::FileNotFound(
                self.config_path.display().to_string(),
            ));
        }

        let contents = fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&contents)?;
        debug!("Loaded configuration from {}", self.config_path.display());
        Ok(config)
    }

    /// Like [`load`](Self::load), but any failure yields the defaults
    pub fn load_or_default(&self) -> Config {
        self.load().unwrap_or_else(|e| {
            debug!("Using default configuration: {}", e);
            Config::default()
        })
    }

    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.access.mode, AccessMode::Auto);
        assert_eq!(config.scanner.max_threads, defaults::scan_threads());
        assert_eq!(config.memory.max_pointer_depth, 8);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_defaults_serialize() {
        let text = toml::to_string(&Config::default()).unwrap();
        assert!(text.contains("mode = \"auto\""));
        assert!(text.contains("chunk_size = 65536"));
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_kernel_mode_survives_save() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(dir.path().join("target.toml"));

        let mut config = Config::default();
        config.access.mode = AccessMode::Kernel;
        config.memory.cache_entries = 4;
        loader.save(&config).unwrap();

        let text = fs::read_to_string(loader.path()).unwrap();
        assert!(text.contains("mode = \"kernel\""));
        assert_eq!(loader.load().unwrap(), config);
    }

    #[test]
    fn test_single_key_override() {
        let config: Config = toml::from_str("[memory]\nmax_pointer_depth = 3\n").unwrap();
        assert_eq!(config.memory.max_pointer_depth, 3);
        assert_eq!(config.memory.cache_entries, defaults::CACHE_ENTRIES);
        assert_eq!(config.scanner, ScannerConfig::default());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result: Result<Config, _> = toml::from_str("[access]\nmode = \"driver\"");
        assert!(result.is_err());
        assert!(matches!(
            ConfigLoader::new("no/such/memclass.toml").load(),
            Err(ConfigError::FileNotFound(_))
        ));
    }
}
