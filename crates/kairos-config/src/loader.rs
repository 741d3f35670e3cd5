//! Configuration loader with multi-source merging

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::{KairosConfig, Paths};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader rooted at the current directory
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "KAIROS".to_string(),
            user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "KAIROS")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip the per-user config file
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<KairosConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = KairosConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/kairos/config.toml)
        if self.user_config
            && let Ok(user_config_file) = Paths::new().user_config_file()
            && user_config_file.exists()
        {
            debug!(path = %user_config_file.display(), "loading user config");
            builder = builder.add_source(
                config::File::from(user_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 3. Project config (kairos.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            debug!(path = %project_config_file.display(), "loading project config");
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Local overrides (kairos.local.toml)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            debug!(path = %local_config_file.display(), "loading local overrides");
            builder = builder.add_source(
                config::File::from(local_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment (KAIROS_SCHEDULER__WAITING_LIST=true)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Load configuration or fall back to defaults
    pub fn load_or_default(self) -> KairosConfig {
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
    use std::fs;

    use kairos_sched::LookaheadBoundary;
    use tempfile::tempdir;

    use super::*;

    fn loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("KAIROS_LOADER_TEST")
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");
        assert_eq!(config, KairosConfig::default());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[scheduler]
waiting_list = true
local_lists = true
lookahead_boundary = "inclusive"

[topology]
entities = 4
links = [
    { a = 0, b = 1, delay = 5 },
    { a = 1, b = 2, delay = 5 },
    { a = 2, b = 3, delay = 15 },
]

[exploration]
enabled = true
max_bound = 300
"#;
        fs::write(project_dir.join("kairos.toml"), config_content)
            .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");
        assert!(config.scheduler.waiting_list);
        assert_eq!(
            config.scheduler.lookahead_boundary,
            LookaheadBoundary::Inclusive
        );
        assert_eq!(config.topology.entities, 4);
        assert_eq!(config.topology.links.len(), 3);
        assert_eq!(config.exploration.max_bound, 300);
        assert_eq!(config.exploration.min_packet_size, 58);

        let scheduler = config.into_scheduler_config().expect("valid config");
        assert_eq!(scheduler.impact_latency.get(0, 3), 25);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("kairos.toml"),
            "[topology]\nentities = 3\ndefault_latency = 5\n",
        )
        .expect("Failed to write project config");
        fs::write(
            project_dir.join("kairos.local.toml"),
            "[topology]\ndefault_latency = 9\n",
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");
        assert_eq!(config.topology.entities, 3);
        assert_eq!(config.topology.default_latency, 9);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("kairos.toml"), "[scheduler\n")
            .expect("Failed to write config");
        assert!(loader(temp_dir.path()).load().is_err());
        assert_eq!(
            loader(temp_dir.path()).load_or_default(),
            KairosConfig::default()
        );
    }
}
