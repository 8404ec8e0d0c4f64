//! Environment variable and config file support for [`CoreBuilder`](super::builder::CoreBuilder).
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic** — values set via builder methods (`buffer_size(4096)`)
//! 2. **Environment variables** — values from `PRETZEL_*` env vars
//! 3. **Config file** — values loaded from a TOML file (requires `config-file` feature)
//! 4. **Defaults** — built-in defaults from [`CoreConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `PRETZEL_BUFSIZE` | `usize` | `buffer_size` |
//! | `PRETZEL_EVENTS_CAPACITY` | `usize` | `events_capacity` |
//! | `PRETZEL_TEST_TIMEOUT` | seconds (`f64`) | [`test_timeout`] |

use crate::runtime::config::CoreConfig;
use std::time::Duration;

/// Environment variable name for the default buffer size.
pub const ENV_BUFSIZE: &str = "PRETZEL_BUFSIZE";
/// Environment variable name for the reactor event capacity.
pub const ENV_EVENTS_CAPACITY: &str = "PRETZEL_EVENTS_CAPACITY";
/// Environment variable name for the async test timeout, in seconds.
pub const ENV_TEST_TIMEOUT: &str = "PRETZEL_TEST_TIMEOUT";

/// Async test timeout used when [`ENV_TEST_TIMEOUT`] is unset.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration error raised while reading overrides.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidValue {
        /// Variable or key name.
        var: String,
        /// Human-readable expected type.
        expected: &'static str,
        /// The raw value.
        value: String,
    },
    /// The config file could not be read.
    #[error("failed to read config file {path}: {reason}")]
    Read {
        /// File path.
        path: String,
        /// Underlying failure.
        reason: String,
    },
    /// The config file could not be parsed.
    #[error("failed to parse TOML config: {0}")]
    Parse(String),
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        let msg = err.to_string();
        Self::new(crate::ErrorKind::Config)
            .with_message(msg)
            .with_source(err)
    }
}

/// Apply environment variable overrides to a [`CoreConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut CoreConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_BUFSIZE) {
        config.buffer_size = parse_usize(ENV_BUFSIZE, &val)?;
    }
    if let Some(val) = read_env(ENV_EVENTS_CAPACITY) {
        config.events_capacity = parse_usize(ENV_EVENTS_CAPACITY, &val)?;
    }
    Ok(())
}

/// Timeout for async tests, from [`ENV_TEST_TIMEOUT`] or the default.
pub fn test_timeout() -> Result<Duration, ConfigError> {
    read_env(ENV_TEST_TIMEOUT).map_or(Ok(DEFAULT_TEST_TIMEOUT), |val| {
        parse_secs(ENV_TEST_TIMEOUT, &val)
    })
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

pub(crate) fn parse_usize(var_name: &str, val: &str) -> Result<usize, ConfigError> {
    val.trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue {
            var: var_name.to_string(),
            expected: "unsigned integer",
            value: val.to_string(),
        })
}

pub(crate) fn parse_secs(var_name: &str, val: &str) -> Result<Duration, ConfigError> {
    val.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| ConfigError::InvalidValue {
            var: var_name.to_string(),
            expected: "non-negative number of seconds",
            value: val.to_string(),
        })
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable core configuration.
///
/// ```toml
/// [core]
/// buffer_size = 65536
/// events_capacity = 256
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct CoreTomlConfig {
    /// Core settings.
    #[serde(default)]
    pub core: CoreToml,
}

/// `[core]` section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct CoreToml {
    /// Default buffered-stream size.
    pub buffer_size: Option<usize>,
    /// Reactor event capacity.
    pub events_capacity: Option<usize>,
}

/// Apply a parsed TOML config to a [`CoreConfig`].
///
/// Only fields that are `Some` in the TOML struct override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut CoreConfig, toml: &CoreTomlConfig) {
    if let Some(v) = toml.core.buffer_size {
        config.buffer_size = v;
    }
    if let Some(v) = toml.core.events_capacity {
        config.events_capacity = v;
    }
}

/// Parse a TOML string into a [`CoreTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<CoreTomlConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Read and parse a TOML file into a [`CoreTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<CoreTomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = crate::test_utils::env_lock();
        for var in &[ENV_BUFSIZE, ENV_EVENTS_CAPACITY, ENV_TEST_TIMEOUT] {
            std::env::remove_var(var);
        }
        f()
    }

    fn with_envs<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        with_clean_env(|| {
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
            let result = f();
            for (k, _) in vars {
                std::env::remove_var(k);
            }
            result
        })
    }

    #[test]
    fn parse_usize_valid() {
        assert_eq!(parse_usize("TEST", "42").unwrap(), 42);
        assert_eq!(parse_usize("TEST", " 100 ").unwrap(), 100);
    }

    #[test]
    fn parse_usize_invalid() {
        assert!(parse_usize("TEST", "abc").is_err());
        assert!(parse_usize("TEST", "-1").is_err());
        assert!(parse_usize("TEST", "").is_err());
    }

    #[test]
    fn parse_secs_accepts_fractions() {
        assert_eq!(parse_secs("T", "0.5").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_secs("T", "3").unwrap(), Duration::from_secs(3));
        assert!(parse_secs("T", "-1").is_err());
        assert!(parse_secs("T", "soon").is_err());
    }

    #[test]
    fn test_timeout_defaults_and_overrides() {
        with_clean_env(|| assert_eq!(test_timeout().unwrap(), DEFAULT_TEST_TIMEOUT));
        with_envs(&[(ENV_TEST_TIMEOUT, "0.25")], || {
            assert_eq!(test_timeout().unwrap(), Duration::from_millis(250));
        });
        with_envs(&[(ENV_TEST_TIMEOUT, "never")], || {
            let err = test_timeout().unwrap_err();
            assert!(err.to_string().contains(ENV_TEST_TIMEOUT));
        });
    }

    #[test]
    fn no_env_leaves_defaults() {
        with_clean_env(|| {
            let mut config = CoreConfig::default();
            apply_env_overrides(&mut config).unwrap();
            assert_eq!(config, CoreConfig::default());
        });
    }

    #[test]
    fn env_overrides_applied() {
        with_envs(&[(ENV_BUFSIZE, "4096"), (ENV_EVENTS_CAPACITY, "32")], || {
            let mut config = CoreConfig::default();
            apply_env_overrides(&mut config).unwrap();
            assert_eq!(config.buffer_size, 4096);
            assert_eq!(config.events_capacity, 32);
        });
    }

    #[test]
    fn invalid_env_reports_variable() {
        with_envs(&[(ENV_BUFSIZE, "lots")], || {
            let mut config = CoreConfig::default();
            let err = apply_env_overrides(&mut config).unwrap_err();
            assert!(err.to_string().contains(ENV_BUFSIZE));
            let err: crate::Error = err.into();
            assert_eq!(err.kind(), crate::ErrorKind::Config);
        });
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_overrides_only_set_fields() {
        let parsed = parse_toml_str("[core]\nbuffer_size = 1024\n").unwrap();
        let mut config = CoreConfig::default();
        apply_toml_config(&mut config, &parsed);
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.events_capacity, CoreConfig::default().events_capacity);
    }
}
