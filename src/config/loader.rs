//! Configuration Loader
//!
//! Environment-aware configuration loading. Built-in defaults are layered
//! under `filer.toml`, then `filer.<environment>.toml`, then `FILER__*`
//! environment variables, and the merged result is validated before use.

use super::error::{ConfigResult, ConfigurationError};
use super::FilerConfig;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Base name of the configuration files inside the config directory
const CONFIG_FILE_STEM: &str = "filer";

/// Prefix of environment variable overrides, e.g. `FILER__WORKER__CONCURRENCY`
const ENV_PREFIX: &str = "FILER";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: FilerConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_overrides(config_dir, environment, None)
    }

    /// Load configuration, reading environment overrides from `overrides`
    /// instead of the process environment when given
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let explicit = config_dir.is_some();
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        if !config_directory.is_dir() {
            if explicit {
                return Err(ConfigurationError::ConfigDirectoryNotFound {
                    path: config_directory,
                });
            }
            warn!(
                directory = %config_directory.display(),
                "Configuration directory not found, using defaults and environment"
            );
        }

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment, overrides)?;
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment,
            concurrency = config.worker.concurrency,
            max_attempts = config.retry.max_attempts,
            disabled_processors = config.processors.disabled.len(),
            "⚙️ Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Manager around an already-built configuration
    pub fn from_config(config: FilerConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &FilerConfig {
        &self.config
    }

    /// Configuration with sensitive fields masked, for debugging output
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment: FILER_ENV || APP_ENV || 'development'
    fn detect_environment() -> String {
        env::var("FILER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<FilerConfig> {
        let defaults = Config::try_from(&FilerConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let base_file = config_directory.join(format!("{CONFIG_FILE_STEM}.toml"));
        let env_file = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));
        debug!(
            base = %base_file.display(),
            environment_file = %env_file.display(),
            "Configuration sources"
        );

        let env_source = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("processors.disabled")
            .source(overrides);

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_file).required(false))
            .add_source(File::from(env_file).required(false))
            .add_source(env_source)
            .build()?;

        merged
            .try_deserialize::<FilerConfig>()
            .map_err(|e| ConfigurationError::load_error(config_directory.display().to_string(), e))
    }

    /// Mask credentials before configuration is written to logs
    fn sanitize_config_for_logging(config: &FilerConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "token", "url"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) {
        fs::write(dir.path().join(name), contents).unwrap();
    }

    fn no_env() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn test_empty_directory_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let manager =
            ConfigManager::load_with_overrides(Some(dir.path().to_path_buf()), "test", no_env())
                .unwrap();
        assert_eq!(manager.config(), &FilerConfig::default());
        assert_eq!(manager.environment(), "test");
    }

    #[test]
    fn test_environment_file_overrides_base_file() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "filer.toml",
            "[worker]\nconcurrency = 8\n\n[retry]\nmax_attempts = 3\n",
        );
        write(&dir, "filer.production.toml", "[worker]\nconcurrency = 16\n");

        let manager = ConfigManager::load_with_overrides(
            Some(dir.path().to_path_buf()),
            "production",
            no_env(),
        )
        .unwrap();
        assert_eq!(manager.config().worker.concurrency, 16);
        assert_eq!(manager.config().retry.max_attempts, 3);
        assert_eq!(
            manager.config().worker.pipeline_timeout_seconds,
            crate::constants::system::DEFAULT_PIPELINE_TIMEOUT_SECONDS
        );
    }

    #[test]
    fn test_environment_variables_take_precedence() {
        let dir = TempDir::new().unwrap();
        write(&dir, "filer.toml", "[logging]\nformat = \"pretty\"\n");
        let overrides = HashMap::from([
            ("FILER__LOGGING__FORMAT".to_string(), "json".to_string()),
            ("FILER__WORKER__CONCURRENCY".to_string(), "2".to_string()),
            (
                "FILER__PROCESSORS__DISABLED".to_string(),
                "annualReport,courtOrder".to_string(),
            ),
        ]);

        let manager = ConfigManager::load_with_overrides(
            Some(dir.path().to_path_buf()),
            "development",
            Some(overrides),
        )
        .unwrap();
        let config = manager.config();
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.worker.concurrency, 2);
        assert_eq!(config.processors.disabled, vec!["annualReport", "courtOrder"]);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "filer.toml", "[worker]\nconcurrency = 0\n");
        let err =
            ConfigManager::load_with_overrides(Some(dir.path().to_path_buf()), "test", no_env())
                .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn test_missing_explicit_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            ConfigManager::load_with_overrides(Some(missing), "test", no_env()).unwrap_err(),
            ConfigurationError::ConfigDirectoryNotFound { .. }
        ));
    }

    #[test]
    fn test_debug_config_masks_database_url() {
        let manager = ConfigManager::from_config(FilerConfig::default(), "test").unwrap();
        let debug = manager.debug_config();
        assert_eq!(debug["database"]["url"], "[MASKED]");
        assert_eq!(debug["worker"]["concurrency"], 4);
    }
}
