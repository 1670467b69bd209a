//! Configuration loader with hierarchical merging.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Config file (explicit path, TOML)
//! 3. Environment variables (`SWITCHYARD_*`)
//!
//! Each layer overrides the previous.

use super::{ConfigError, SwitchyardConfig};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```
/// use switchyard_runtime::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .skip_env_vars() // For testing
///     .load()
///     .unwrap();
/// assert_eq!(config.bus.queue_cap, 500);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Config file path. No file layer is applied when unset.
    path: Option<PathBuf>,

    /// Skip environment variable loading.
    skip_env: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: None,
            skip_env: false,
        }
    }

    /// Sets the config file path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    ///
    /// Useful for testing with deterministic config.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Loads and merges configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file exists but cannot be
    /// parsed, or an environment variable holds an unparseable value.
    /// A missing config file is silently ignored.
    pub fn load(&self) -> Result<SwitchyardConfig, ConfigError> {
        // Start with defaults
        let mut config = SwitchyardConfig::default();

        // Layer 1: config file
        if let Some(ref path) = self.path {
            if let Some(file_config) = load_file(path)? {
                debug!(path = %path.display(), "loaded config file");
                config.merge(&file_config);
            }
        }

        // Layer 2: environment variables
        if !self.skip_env {
            apply_env_vars(&mut config)?;
        }

        Ok(config)
    }
}

/// Loads a config file, returning None if it doesn't exist.
fn load_file(path: &Path) -> Result<Option<SwitchyardConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    let config =
        SwitchyardConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;

    Ok(Some(config))
}

/// Applies environment variable overrides.
fn apply_env_vars(config: &mut SwitchyardConfig) -> Result<(), ConfigError> {
    // Numeric environment variables
    apply_parsed(&mut config.bus.tick_ms, "SWITCHYARD_BUS_TICK_MS")?;
    apply_parsed(&mut config.bus.queue_cap, "SWITCHYARD_BUS_QUEUE_CAP")?;
    apply_parsed(&mut config.flow.max_active, "SWITCHYARD_FLOW_MAX_ACTIVE")?;
    apply_parsed(&mut config.flow.retry_limit, "SWITCHYARD_FLOW_RETRY_LIMIT")?;
    apply_parsed(&mut config.state.snapshot_cap, "SWITCHYARD_STATE_SNAPSHOT_CAP")?;
    apply_parsed(&mut config.dispatch.cache_ttl_secs, "SWITCHYARD_CACHE_TTL_SECS")?;
    apply_parsed(&mut config.offload.timeout_secs, "SWITCHYARD_OFFLOAD_TIMEOUT_SECS")?;

    // Boolean environment variables
    if let Ok(raw) = std::env::var("SWITCHYARD_OFFLOAD_ENABLED") {
        config.offload.enabled = parse_bool(&raw)
            .ok_or_else(|| ConfigError::invalid_env_var("SWITCHYARD_OFFLOAD_ENABLED", "expected bool"))?;
    }

    Ok(())
}

/// Overwrites `field` from the named env var when it is set.
fn apply_parsed<T: FromStr>(field: &mut T, name: &str) -> Result<(), ConfigError> {
    if let Ok(raw) = std::env::var(name) {
        *field = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid_env_var(name, format!("cannot parse '{raw}'")))?;
    }
    Ok(())
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off"
/// (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_defaults_only() {
        let config = ConfigLoader::new().skip_env_vars().load().unwrap();
        assert_eq!(config, SwitchyardConfig::default());
    }

    #[test]
    fn load_file_layer() {
        let temp = TempDir::new().unwrap();
        let config_path = create_config_file(
            temp.path(),
            r#"
[bus]
tick_ms = 5
queue_cap = 64

[flow]
retry_limit = 1
"#,
        );

        let config = ConfigLoader::new()
            .with_path(&config_path)
            .skip_env_vars()
            .load()
            .unwrap();

        assert_eq!(config.bus.tick_ms, 5);
        assert_eq!(config.bus.queue_cap, 64);
        assert_eq!(config.flow.retry_limit, 1);
        // Rest stays at defaults
        assert_eq!(config.bus.batch_size, 10);
    }

    #[test]
    fn missing_config_file_ok() {
        let config = ConfigLoader::new()
            .with_path("/nonexistent/path/config.toml")
            .skip_env_vars()
            .load()
            .unwrap();

        // Should return defaults
        assert_eq!(config, SwitchyardConfig::default());
    }

    #[test]
    fn malformed_config_file_errors() {
        let temp = TempDir::new().unwrap();
        let config_path = create_config_file(temp.path(), "bus = \"not a table\"");

        let err = ConfigLoader::new()
            .with_path(&config_path)
            .skip_env_vars()
            .load()
            .unwrap_err();

        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));

        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));

        assert_eq!(parse_bool("invalid"), None);
    }

    #[test]
    fn env_var_layer() {
        // This test modifies env vars; it is the only test that loads
        // without skip_env_vars, so parallel tests are unaffected.
        std::env::set_var("SWITCHYARD_BUS_TICK_MS", "7");
        std::env::set_var("SWITCHYARD_OFFLOAD_ENABLED", "off");

        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.bus.tick_ms, 7);
        assert!(!config.offload.enabled);

        std::env::set_var("SWITCHYARD_FLOW_RETRY_LIMIT", "lots");
        let err = ConfigLoader::new().load().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));

        // Cleanup
        std::env::remove_var("SWITCHYARD_BUS_TICK_MS");
        std::env::remove_var("SWITCHYARD_OFFLOAD_ENABLED");
        std::env::remove_var("SWITCHYARD_FLOW_RETRY_LIMIT");
    }
}
