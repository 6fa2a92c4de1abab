//! Configuration
//!
//! TOML configuration for the access path, the scanner, buffer limits and
//! logging, with per-field defaults and validation.

pub mod defaults;
mod loader;
mod validator;

pub use loader::{
    AccessConfig, Config, ConfigError, ConfigLoader, LoggingConfig, MemoryConfig, ScannerConfig,
};
pub use validator::{validate_config, ConfigValidator};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_from_io() {
        use std::io;
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let config_error: ConfigError = io_error.into();
        assert!(matches!(config_error, ConfigError::Io(_)));
    }

    #[test]
    fn test_unreadable_path_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        // A directory exists but cannot be read as a file.
        let result: ConfigResult<Config> = ConfigLoader::new(dir.path()).load();
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
