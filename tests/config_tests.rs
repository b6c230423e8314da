//! Configuration Module Tests
//!
//! Loading loader settings from files and the environment, and validating
//! the result. Every test holds [`EnvGuard`] since environment variables are
//! process-wide and every settings load reads them.

use dataloader_core::config::{detect_environment, LoaderConfig, LoaderSettings, SettingsManager};
use dataloader_core::ConfigurationError;
use parking_lot::{const_mutex, Mutex, MutexGuard};
use std::env;
use std::fs;
use std::time::Duration;

static ENV_LOCK: Mutex<()> = const_mutex(());

const MANAGED_VARS: &[&str] = &[
    "DATALOADER_ENV",
    "APP_ENV",
    "RUST_ENV",
    "DATALOADER_MAX_BATCH",
    "DATALOADER_WAIT_MS",
    "DATALOADER__DEFAULT__MAX_BATCH",
    "DATALOADER__DEFAULT__WAIT_MS",
];

/// Serializes environment access and restores the variables on drop
struct EnvGuard {
    saved: Vec<(&'static str, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Take the lock and start from an environment without loader variables
    fn clean() -> Self {
        let lock = ENV_LOCK.lock();
        let saved = MANAGED_VARS
            .iter()
            .map(|name| (*name, env::var(name).ok()))
            .collect();
        for name in MANAGED_VARS {
            env::remove_var(name);
        }
        Self { saved, _lock: lock }
    }

    fn set(&self, name: &str, value: &str) {
        env::set_var(name, value);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (name, value) in &self.saved {
            match value {
                Some(value) => env::set_var(name, value),
                None => env::remove_var(name),
            }
        }
    }
}

#[test]
fn settings_have_expected_defaults() {
    let _env = EnvGuard::clean();
    let settings = LoaderSettings::default();

    assert_eq!(settings.default.max_batch, 200);
    assert_eq!(settings.default.wait(), Duration::from_millis(10));
    assert!(settings.overrides.is_empty());
}

#[test]
fn toml_file_with_overrides_loads() {
    let _env = EnvGuard::clean();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("loaders.toml");
    fs::write(
        &path,
        r#"
[default]
max_batch = 150
wait_ms = 15

[overrides.formation_status]
max_batch = 0
wait_ms = 2
"#,
    )
    .expect("write config");

    let manager = SettingsManager::load_from_file(&path).expect("load");
    let settings = manager.settings();

    assert_eq!(settings.default.max_batch, 150);
    assert_eq!(
        settings.for_entity("formation_status"),
        LoaderConfig {
            max_batch: 0,
            wait_ms: 2
        }
    );
    assert_eq!(settings.for_entity("bundle").wait_ms, 15);
    assert_eq!(manager.sources(), &[path]);
}

#[test]
fn json_file_loads_with_partial_fields() {
    let _env = EnvGuard::clean();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("loaders.json");
    fs::write(&path, r#"{ "default": { "wait_ms": 25 } }"#).expect("write config");

    let manager = SettingsManager::load_from_file(&path).expect("load");

    assert_eq!(manager.settings().default.wait_ms, 25);
    assert_eq!(manager.settings().default.max_batch, 200);
    assert_eq!(manager.debug_config()["settings"]["default"]["wait_ms"], 25);
}

#[test]
fn invalid_window_is_rejected() {
    let _env = EnvGuard::clean();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("loaders.toml");
    fs::write(&path, "[default]\nwait_ms = 600000\n").expect("write config");

    let err = SettingsManager::load_from_file(&path).expect_err("window too long");
    assert!(matches!(err, ConfigurationError::Invalid(_)));
}

#[test]
fn missing_file_is_a_source_error() {
    let _env = EnvGuard::clean();
    let dir = tempfile::tempdir().expect("tempdir");
    let err = SettingsManager::load_from_file(dir.path().join("absent.toml"))
        .expect_err("file is required");
    assert!(matches!(err, ConfigurationError::Source(_)));
}

#[test]
fn env_overrides_replace_default_batching() {
    let env = EnvGuard::clean();
    env.set("DATALOADER_MAX_BATCH", "50");
    env.set("DATALOADER_WAIT_MS", "3");

    let bundle = LoaderConfig {
        max_batch: 5,
        wait_ms: 1,
    };
    let settings = LoaderSettings::default()
        .with_override("bundle", bundle.clone())
        .with_env_overrides();

    assert_eq!(
        settings.default,
        LoaderConfig {
            max_batch: 50,
            wait_ms: 3
        }
    );
    assert_eq!(settings.for_entity("bundle"), bundle);
}

#[test]
fn unparseable_env_overrides_are_ignored() {
    let env = EnvGuard::clean();
    env.set("DATALOADER_MAX_BATCH", "lots");
    env.set("DATALOADER_WAIT_MS", "-1");

    let settings = LoaderSettings::default().with_env_overrides();

    assert_eq!(settings.default, LoaderConfig::default());
}

#[test]
fn from_environment_picks_the_preset() {
    let env = EnvGuard::clean();
    assert_eq!(LoaderSettings::from_environment(), LoaderSettings::default());

    env.set("DATALOADER_ENV", "test");
    assert_eq!(LoaderSettings::from_environment(), LoaderSettings::for_test());

    env.set("DATALOADER_ENV", "development");
    env.set("DATALOADER_WAIT_MS", "7");
    let settings = LoaderSettings::from_environment();
    assert_eq!(settings.default.max_batch, 200);
    assert_eq!(settings.default.wait_ms, 7);
}

#[test]
fn environment_name_precedence() {
    let env = EnvGuard::clean();
    assert_eq!(detect_environment(), "production");

    env.set("RUST_ENV", "staging");
    assert_eq!(detect_environment(), "staging");

    env.set("APP_ENV", "development");
    assert_eq!(detect_environment(), "development");

    env.set("DATALOADER_ENV", "test");
    assert_eq!(detect_environment(), "test");
}

#[test]
fn environment_source_overrides_file_values() {
    let env = EnvGuard::clean();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("loaders.toml");
    fs::write(&path, "[default]\nmax_batch = 40\nwait_ms = 4\n").expect("write config");

    env.set("DATALOADER__DEFAULT__WAIT_MS", "20");
    let manager = SettingsManager::load_from_file(&path).expect("load");

    assert_eq!(manager.settings().default.wait_ms, 20);
    assert_eq!(manager.settings().default.max_batch, 40);
    assert_eq!(manager.environment(), "production");
}

#[test]
fn environment_source_applies_to_directory_layers() {
    let env = EnvGuard::clean();
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("dataloader.toml"), "[default]\nmax_batch = 60\n").expect("write base");

    env.set("DATALOADER__DEFAULT__MAX_BATCH", "8");
    let manager = SettingsManager::load_from_directory_with_env(dir.path(), "staging").expect("load");

    assert_eq!(manager.settings().default.max_batch, 8);
    assert_eq!(manager.environment(), "staging");
    assert_eq!(manager.sources(), &[dir.path().join("dataloader.toml")]);
}
