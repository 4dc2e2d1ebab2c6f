//! Configuration loader with multi-source merging

use crate::{Paths, StategraphConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "STATEGRAPH".to_string(),
            user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "STATEGRAPH")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/stategraph/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<StategraphConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = StategraphConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/stategraph/config.toml)
        if self.user_config {
            if let Ok(user_config_file) = Paths::new().user_config_file() {
                if user_config_file.exists() {
                    tracing::debug!(path = %user_config_file.display(), "loading user config");
                    builder = builder.add_source(
                        config::File::from(user_config_file)
                            .required(false)
                            .format(config::FileFormat::Toml),
                    );
                }
            }
        }

        // 3. Project config, then the gitignored local override
        for file in [
            Paths::project_config_file(&self.project_dir),
            Paths::local_config_file(&self.project_dir),
        ] {
            if file.exists() {
                tracing::debug!(path = %file.display(), "loading project config");
                builder = builder.add_source(
                    config::File::from(file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        // 4. Environment variables (STATEGRAPH_KERNEL__MAX_SETTLE_ROUNDS=8)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let stategraph_config: StategraphConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        stategraph_config.validate()?;

        Ok(stategraph_config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> StategraphConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn loader(project_dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_prefix("STATEGRAPH_LOADER_TEST")
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config.kernel.max_settle_rounds, 64);
        assert_eq!(config.kernel.first_node_id, 1);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[kernel]
max_settle_rounds = 16
warn_on_provider_shortfall = false

[logging]
filter = "stategraph_kernel=debug"
"#;
        fs::write(project_dir.join("stategraph.toml"), config_content)
            .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.kernel.max_settle_rounds, 16);
        assert!(!config.kernel.warn_on_provider_shortfall);
        assert_eq!(config.kernel.first_node_id, 1);
        assert_eq!(config.logging.filter, "stategraph_kernel=debug");
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("stategraph.toml"),
            "[kernel]\nmax_settle_rounds = 16\n",
        )
        .expect("Failed to write project config");
        fs::write(
            project_dir.join("stategraph.local.toml"),
            "[kernel]\nmax_settle_rounds = 4\n",
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.kernel.max_settle_rounds, 4);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();
        fs::write(
            project_dir.join("stategraph.toml"),
            "[kernel]\nmax_settle_rounds = 0\n",
        )
        .expect("Failed to write config");

        let error = loader(project_dir).load().unwrap_err();
        assert!(error.to_string().contains("max_settle_rounds"));

        let config = loader(project_dir).load_or_default();
        assert_eq!(config.kernel.max_settle_rounds, 64);
    }

    // Environment overrides are not exercised here: mutating the process
    // environment is unsafe under edition 2024. In actual usage:
    //
    // STATEGRAPH_KERNEL__MAX_SETTLE_ROUNDS=8
    // STATEGRAPH_LOGGING__FILTER=debug
}
