//! Configuration management for stategraph
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (STATEGRAPH_* prefix, `__` between sections)
//! 2. stategraph.local.toml (gitignored, local overrides)
//! 3. stategraph.toml (git-tracked, project config)
//! 4. ~/.config/stategraph/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod error;
mod loader;
mod paths;
mod telemetry;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE, Paths};
pub use telemetry::init_tracing;

/// Main stategraph configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StategraphConfig {
    pub kernel: KernelConfig,
    pub logging: LoggingConfig,
}

/// Tunables handed to the state graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Bound on computed/task/listener rounds within one commit.
    pub max_settle_rounds: usize,
    /// Id given to the first node registered with a root.
    pub first_node_id: i32,
    pub warn_on_provider_shortfall: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_settle_rounds: 64,
            first_node_id: 1,
            warn_on_provider_shortfall: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`.
    pub filter: String,
    pub with_target: bool,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            with_target: true,
            ansi: true,
        }
    }
}

impl StategraphConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Read a single TOML file, without merging any other source.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration for tests: verbose kernel logs, tight settle bound
    pub fn testing() -> Self {
        Self {
            kernel: KernelConfig {
                max_settle_rounds: 8,
                ..Default::default()
            },
            logging: LoggingConfig {
                filter: "stategraph_kernel=debug,warn".to_string(),
                ansi: false,
                ..Default::default()
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kernel.max_settle_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "kernel.max_settle_rounds must be greater than zero".to_string(),
            ));
        }
        if self.kernel.first_node_id <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "kernel.first_node_id must be positive, got {}",
                self.kernel.first_node_id
            )));
        }
        telemetry::parse_filter(&self.logging.filter)?;
        Ok(())
    }
}
