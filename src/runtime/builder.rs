//! Core builder.
//!
//! Layers configuration sources in precedence order: defaults, then the
//! config file (if any), then environment variables (if enabled), then values
//! set through builder methods.

use crate::error::Result;
use crate::runtime::config::CoreConfig;
use crate::runtime::core::Core;
use crate::runtime::env_config::apply_env_overrides;

/// Builder for constructing a [`Core`] with custom configuration.
#[derive(Debug, Clone, Default)]
pub struct CoreBuilder {
    buffer_size: Option<usize>,
    events_capacity: Option<usize>,
    use_env: bool,
    #[cfg(feature = "config-file")]
    config_file: Option<std::path::PathBuf>,
}

impl CoreBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder that also reads `PRETZEL_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new().with_env_overrides()
    }

    /// Apply `PRETZEL_*` environment variables above the config file and
    /// below builder values.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Set the default stream buffer size (rounded up to a power of two).
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Set the number of readiness events collected per reactor poll.
    #[must_use]
    pub fn events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = Some(capacity);
        self
    }

    /// Load settings from a TOML file below env and builder values.
    #[cfg(feature = "config-file")]
    #[must_use]
    pub fn config_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Resolve the final configuration without building a core.
    pub fn resolve(&self) -> Result<CoreConfig> {
        let mut config = CoreConfig::default();

        #[cfg(feature = "config-file")]
        if let Some(path) = &self.config_file {
            let toml = crate::runtime::env_config::parse_toml_file(path)?;
            crate::runtime::env_config::apply_toml_config(&mut config, &toml);
        }

        if self.use_env {
            apply_env_overrides(&mut config)?;
        }
        if let Some(size) = self.buffer_size {
            config.buffer_size = size;
        }
        if let Some(capacity) = self.events_capacity {
            config.events_capacity = capacity;
        }
        config.normalize();
        Ok(config)
    }

    /// Build the core.
    pub fn build(self) -> Result<Core> {
        let config = self.resolve()?;
        tracing::debug!(
            buffer_size = config.buffer_size,
            events_capacity = config.events_capacity,
            "building core"
        );
        Core::with_config(config)
    }
}
