//! # Loader Configuration
//!
//! Batching parameters for request-scoped loaders. A single default applies to
//! every entity, with optional per-entity overrides keyed by the entity name.
//! Presets exist for production, development and test environments, and a
//! handful of environment variables can override the defaults at startup.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dataloader_core::config::LoaderSettings;
//!
//! let settings = LoaderSettings::from_environment();
//! settings.validate().expect("invalid loader settings");
//!
//! let bundles = settings.for_entity("bundle");
//! println!("bundle loader waits {:?}", bundles.wait());
//! ```

pub mod manager;

use crate::error::{ConfigurationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

pub use manager::SettingsManager;

/// Longest coalescing window accepted by validation
pub const MAX_WAIT_MS: u64 = 60_000;

/// Batching parameters for a single loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Keys per batch before an early flush; 0 means unlimited
    pub max_batch: usize,
    /// Coalescing window in milliseconds
    pub wait_ms: u64,
}

impl LoaderConfig {
    /// The window has millisecond resolution; a partial millisecond rounds up
    /// so a non-zero `wait` never collapses to zero.
    pub fn new(max_batch: usize, wait: Duration) -> Self {
        let mut millis = wait.as_millis();
        if wait.subsec_nanos() % 1_000_000 != 0 {
            millis += 1;
        }

        Self {
            max_batch,
            wait_ms: u64::try_from(millis).unwrap_or(u64::MAX),
        }
    }

    /// Get the coalescing window as Duration
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    /// Whether batches are capped at a key count
    pub fn is_bounded(&self) -> bool {
        self.max_batch != 0
    }

    fn validate(&self, label: &str) -> Result<()> {
        if self.wait_ms > MAX_WAIT_MS {
            return Err(ConfigurationError::Invalid(format!(
                "{label}: wait_ms {} exceeds the {MAX_WAIT_MS}ms limit",
                self.wait_ms
            )));
        }

        if self.max_batch == 1 {
            warn!(loader = label, "max_batch is 1 - batching effectively disabled");
        }

        Ok(())
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_batch: 200,
            wait_ms: 10,
        }
    }
}

/// Loader settings for every entity attached by the middleware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    /// Applies to entities without an override
    pub default: LoaderConfig,
    /// Per-entity settings keyed by `Entity::NAME`
    pub overrides: HashMap<String, LoaderConfig>,
}

impl Default for LoaderSettings {
    /// Production settings
    fn default() -> Self {
        Self {
            default: LoaderConfig::default(),
            overrides: HashMap::new(),
        }
    }
}

impl LoaderSettings {
    /// Short windows so tests spend little time waiting on timers
    pub fn for_test() -> Self {
        Self {
            default: LoaderConfig {
                max_batch: 100,
                wait_ms: 1,
            },
            overrides: HashMap::new(),
        }
    }

    pub fn for_development() -> Self {
        Self {
            default: LoaderConfig {
                max_batch: 200,
                wait_ms: 5,
            },
            overrides: HashMap::new(),
        }
    }

    /// Pick a preset from the detected environment and apply env overrides
    pub fn from_environment() -> Self {
        let environment = detect_environment();

        let settings = match environment.as_str() {
            "test" => {
                info!("Loading test loader settings (short windows)");
                Self::for_test()
            }
            "development" => {
                info!("Loading development loader settings");
                Self::for_development()
            }
            _ => {
                info!("Loading production loader settings");
                Self::default()
            }
        };

        settings.with_env_overrides()
    }

    /// Apply `DATALOADER_MAX_BATCH` and `DATALOADER_WAIT_MS` to the default config
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(max) = env::var("DATALOADER_MAX_BATCH") {
            match max.parse::<usize>() {
                Ok(max_batch) => {
                    self.default.max_batch = max_batch;
                    info!("Loader max_batch override: {}", max_batch);
                }
                Err(_) => warn!(value = %max, "Ignoring unparseable DATALOADER_MAX_BATCH"),
            }
        }

        if let Ok(wait) = env::var("DATALOADER_WAIT_MS") {
            match wait.parse::<u64>() {
                Ok(wait_ms) => {
                    self.default.wait_ms = wait_ms;
                    info!("Loader wait override: {}ms", wait_ms);
                }
                Err(_) => warn!(value = %wait, "Ignoring unparseable DATALOADER_WAIT_MS"),
            }
        }

        self
    }

    /// Register an override for one entity
    pub fn with_override(mut self, entity: impl Into<String>, config: LoaderConfig) -> Self {
        self.overrides.insert(entity.into(), config);
        self
    }

    /// Settings for the named entity, falling back to the default
    pub fn for_entity(&self, entity: &str) -> LoaderConfig {
        self.overrides
            .get(entity)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    pub fn log_configuration(&self) {
        info!("Loader Configuration:");
        info!(
            "  Default: max_batch {}, wait {}ms",
            self.default.max_batch, self.default.wait_ms
        );
        for (entity, config) in &self.overrides {
            info!(
                "  {}: max_batch {}, wait {}ms",
                entity, config.max_batch, config.wait_ms
            );
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.default.validate("default")?;
        for (entity, config) in &self.overrides {
            if entity.trim().is_empty() {
                return Err(ConfigurationError::Invalid(
                    "override entity name must not be empty".to_string(),
                ));
            }
            config.validate(entity)?;
        }
        Ok(())
    }
}

/// Current environment name, defaulting to production
pub fn detect_environment() -> String {
    env::var("DATALOADER_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .or_else(|_| env::var("RUST_ENV"))
        .unwrap_or_else(|_| "production".to_string())
}
