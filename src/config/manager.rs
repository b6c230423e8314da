//! Settings Manager
//!
//! Environment-aware loading of [`LoaderSettings`] from files. A base file
//! (`dataloader.toml`) is layered with an optional environment file
//! (`dataloader-<env>.toml`) and finally `DATALOADER__*` environment
//! variables, e.g. `DATALOADER__DEFAULT__WAIT_MS=20`.

use super::{detect_environment, LoaderSettings};
use crate::error::Result;
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const BASE_FILE: &str = "dataloader.toml";
const ENV_PREFIX: &str = "DATALOADER";

/// Loaded and validated loader settings together with their origin
#[derive(Debug)]
pub struct SettingsManager {
    settings: LoaderSettings,
    environment: String,
    sources: Vec<PathBuf>,
}

impl SettingsManager {
    /// Load settings from a single file (format inferred from the extension)
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Arc<SettingsManager>> {
        let path = path.as_ref().to_path_buf();
        let config = Config::builder()
            .add_source(File::from(path.as_path()))
            .add_source(env_source())
            .build()?;

        Self::finish(config, detect_environment(), vec![path])
    }

    /// Load `dataloader.toml` and `dataloader-<env>.toml` from a directory
    pub fn load_from_directory(dir: impl AsRef<Path>) -> Result<Arc<SettingsManager>> {
        Self::load_from_directory_with_env(dir, &detect_environment())
    }

    /// Same as [`Self::load_from_directory`] with an explicit environment,
    /// useful for tests that must not touch process environment variables
    pub fn load_from_directory_with_env(
        dir: impl AsRef<Path>,
        environment: &str,
    ) -> Result<Arc<SettingsManager>> {
        let dir = dir.as_ref();
        let base = dir.join(BASE_FILE);
        let overlay = dir.join(format!("dataloader-{environment}.toml"));

        debug!(
            "Loading loader settings for environment '{}' from directory: {}",
            environment,
            dir.display()
        );

        let config = Config::builder()
            .add_source(File::from(base.as_path()).required(false))
            .add_source(File::from(overlay.as_path()).required(false))
            .add_source(env_source())
            .build()?;

        let sources = [base, overlay]
            .into_iter()
            .filter(|path| path.exists())
            .collect();

        Self::finish(config, environment.to_string(), sources)
    }

    fn finish(
        config: Config,
        environment: String,
        sources: Vec<PathBuf>,
    ) -> Result<Arc<SettingsManager>> {
        let settings: LoaderSettings = config.try_deserialize()?;
        settings.validate()?;

        let manager = SettingsManager {
            settings,
            environment,
            sources,
        };

        debug!(
            "Loader settings loaded: {}",
            serde_json::to_string(&manager.debug_config())
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        Ok(Arc::new(manager))
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Files that contributed to the settings, in layering order
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// JSON view of the effective settings for diagnostics
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::json!({
            "environment": self.environment,
            "sources": self.sources,
            "settings": self.settings,
        })
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX).separator("__")
}
