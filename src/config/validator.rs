//! Configuration validator
//!
//! Range checks run after loading; the first violated rule is reported.

use super::loader::{Config, ConfigError, LoggingConfig, MemoryConfig, ScannerConfig};
use super::ConfigResult;
use tracing::warn;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MAX_SCAN_THREADS: usize = 128;
const MAX_POINTER_DEPTH: usize = 64;
const LARGE_READ: usize = 100 * 1024 * 1024;

fn ensure(ok: bool, message: impl FnOnce() -> String) -> ConfigResult<()> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid(message()))
    }
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> ConfigResult<()> {
        Self::scanner(&config.scanner)?;
        Self::memory(&config.memory, &config.scanner)?;
        Self::logging(&config.logging)
    }

    fn scanner(scanner: &ScannerConfig) -> ConfigResult<()> {
        ensure((1..=MAX_SCAN_THREADS).contains(&scanner.max_threads), || {
            format!(
                "scanner.max_threads is {}, expected 1..={}",
                scanner.max_threads, MAX_SCAN_THREADS
            )
        })?;
        ensure(scanner.chunk_size.is_power_of_two(), || {
            format!(
                "scanner.chunk_size {} is not a power of two",
                scanner.chunk_size
            )
        })?;
        let alignment = scanner.fast_scan_alignment;
        ensure(alignment.is_power_of_two() && alignment <= 8, || {
            format!("scanner.fast_scan_alignment {} is not 1, 2, 4 or 8", alignment)
        })
    }

    fn memory(memory: &MemoryConfig, scanner: &ScannerConfig) -> ConfigResult<()> {
        ensure(memory.max_read_size >= scanner.chunk_size, || {
            format!(
                "memory.max_read_size {} is smaller than one scan chunk ({})",
                memory.max_read_size, scanner.chunk_size
            )
        })?;
        if memory.max_read_size > LARGE_READ {
            warn!(
                "memory.max_read_size is {} MiB; single reads that large may stall the target",
                memory.max_read_size / (1024 * 1024)
            );
        }
        ensure(memory.cache_entries > 0, || {
            "memory.cache_entries must hold at least one range".to_string()
        })?;
        ensure(
            (1..=MAX_POINTER_DEPTH).contains(&memory.max_pointer_depth),
            || {
                format!(
                    "memory.max_pointer_depth is {}, expected 1..={}",
                    memory.max_pointer_depth, MAX_POINTER_DEPTH
                )
            },
        )
    }

    fn logging(logging: &LoggingConfig) -> ConfigResult<()> {
        let level = logging.level.to_ascii_lowercase();
        ensure(LOG_LEVELS.contains(&level.as_str()), || {
            format!(
                "logging.level '{}' is not one of {}",
                logging.level,
                LOG_LEVELS.join(", ")
            )
        })
    }
}

pub fn validate_config(config: &Config) -> ConfigResult<()> {
    ConfigValidator::validate(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid(mutate: impl FnOnce(&mut Config)) -> bool {
        let mut config = Config::default();
        mutate(&mut config);
        matches!(validate_config(&config), Err(ConfigError::Invalid(_)))
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_scanner_rules() {
        assert!(invalid(|c| c.scanner.max_threads = 0));
        assert!(invalid(|c| c.scanner.max_threads = 129));
        assert!(invalid(|c| c.scanner.chunk_size = 3000));
        assert!(invalid(|c| c.scanner.fast_scan_alignment = 3));
        assert!(invalid(|c| c.scanner.fast_scan_alignment = 16));
        assert!(!invalid(|c| c.scanner.fast_scan_alignment = 1));
    }

    #[test]
    fn test_memory_rules() {
        assert!(invalid(|c| c.memory.max_read_size = 1024));
        assert!(invalid(|c| c.memory.cache_entries = 0));
        assert!(invalid(|c| c.memory.max_pointer_depth = 0));
        assert!(invalid(|c| c.memory.max_pointer_depth = 65));
    }

    #[test]
    fn test_message_names_the_field() {
        let mut config = Config::default();
        config.memory.max_pointer_depth = 99;
        let message = validate_config(&config).unwrap_err().to_string();
        assert!(message.contains("memory.max_pointer_depth is 99"), "{}", message);
    }

    #[test]
    fn test_logging_rules() {
        assert!(invalid(|c| c.logging.level = "verbose".to_string()));
        assert!(!invalid(|c| c.logging.level = "DEBUG".to_string()));
    }
}
