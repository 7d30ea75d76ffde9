//! Desired-state configuration for tunnelward.
//!
//! One TOML file plus `TUNNELWARD_`-prefixed environment variables, merged
//! through figment into engine tuning, host capability and one
//! `ProfileSettings` table per tunnel class. [`store`] exposes the same
//! sources as a typed key/value [`ConfigStore`].

pub mod store;

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tunnelward_core::{EngineConfig, HostCapability, ProfileClass, ProfileSettings};

pub use store::{ConfigStore, ConfigValue, FileConfigStore, Scope};

/// Environment prefix. Nested keys use `__`, e.g.
/// `TUNNELWARD_ENGINE__TICK_INTERVAL_SECS=60`.
pub const ENV_PREFIX: &str = "TUNNELWARD_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<ConfigError> for tunnelward_core::CoreError {
    fn from(err: ConfigError) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub host: HostSettings,

    /// Desired settings per tunnel class.
    #[serde(default)]
    pub profiles: Profiles,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HostSettings {
    /// OS build number the generated documents target.
    pub build: u32,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            build: HostCapability::default().build,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<ProfileSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ProfileSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_backup: Option<ProfileSettings>,
}

impl Config {
    pub fn capability(&self) -> HostCapability {
        HostCapability::new(self.host.build)
    }

    /// Configured classes in deployment order. The class always follows
    /// the table a profile was read from.
    pub fn profile_settings(&self) -> Vec<ProfileSettings> {
        let p = &self.profiles;
        [
            (ProfileClass::Machine, &p.machine),
            (ProfileClass::User, &p.user),
            (ProfileClass::UserBackup, &p.user_backup),
        ]
        .into_iter()
        .filter_map(|(class, settings)| {
            settings.clone().map(|mut s| {
                s.class = class;
                s
            })
        })
        .collect()
    }

    pub fn settings_for(&self, class: ProfileClass) -> Option<ProfileSettings> {
        self.profile_settings().into_iter().find(|s| s.class == class)
    }

    /// Checks that hold across sections. Per-profile rules belong to the
    /// generator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.tick_interval_secs == 0 {
            return Err(ConfigError::Validation {
                field: "engine.tick_interval_secs".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.engine.restart_service.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "engine.restart_service".into(),
                reason: "must not be empty".into(),
            });
        }

        let settings = self.profile_settings();
        for (i, a) in settings.iter().enumerate() {
            let name = a.name.trim();
            if name.is_empty() {
                continue;
            }
            if let Some(b) = settings[i + 1..]
                .iter()
                .find(|b| b.name.trim().eq_ignore_ascii_case(name))
            {
                return Err(ConfigError::Validation {
                    field: format!("profiles.{}.name", b.class),
                    reason: format!("'{name}' is already used by profiles.{}", a.class),
                });
            }
        }
        Ok(())
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "tunnelward", "tunnelward").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("tunnelward");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// The file at `path` layered over defaults, with the environment on top.
pub fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate the Config at the canonical path.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load and validate the Config at `path`. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment_for(path).extract()?;
    config.validate()?;
    tracing::debug!(
        path = %path.display(),
        profiles = config.profile_settings().len(),
        "config loaded"
    );
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tunnelward_core::VpnStrategy;

    const SAMPLE: &str = r#"
[engine]
tick_interval_secs = 120
allow_updates_while_connected = true

[host]
build = 17763

[profiles.machine]
name = "Contoso Device"
external_address = "vpn.contoso.com"
strategy = "Ikev2Only"
include_routes = { "10.0.0.0/8" = "corp" }

[profiles.user]
name = "Contoso VPN"
external_address = "vpn.contoso.com"
dns_suffixes = ["corp.contoso.com"]

[profiles.user.eap]
trusted_root_thumbprints = ["3f3f3f3f3f3f3f3f3f3f3f3f3f3f3f3f3f3f3f3f"]
nps_servers = ["nps01.corp.contoso.com"]
"#;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.profile_settings().is_empty());
    }

    #[test]
    fn sections_load_with_class_taken_from_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&write(&dir, SAMPLE)).unwrap();

        assert_eq!(config.engine.tick_interval_secs, 120);
        assert!(config.engine.allow_updates_while_connected);
        // Unset keys keep their defaults.
        assert_eq!(config.engine.delete_timeout_secs, 30);
        assert_eq!(config.capability(), HostCapability::new(17763));

        let classes: Vec<ProfileClass> =
            config.profile_settings().iter().map(|s| s.class).collect();
        assert_eq!(classes, vec![ProfileClass::Machine, ProfileClass::User]);

        let device = config.settings_for(ProfileClass::Machine).unwrap();
        assert_eq!(device.strategy, VpnStrategy::Ikev2Only);
        assert_eq!(
            device.include_routes.get("10.0.0.0/8").map(String::as_str),
            Some("corp")
        );

        let user = config.settings_for(ProfileClass::User).unwrap();
        assert_eq!(user.eap.nps_servers, vec!["nps01.corp.contoso.com"]);
        assert!(config.settings_for(ProfileClass::UserBackup).is_none());
    }

    #[test]
    fn duplicate_names_across_classes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "[profiles.user]\nname = \"Corp\"\n[profiles.user_backup]\nname = \"corp\"\n",
        );
        let err = load_config_from(&path).unwrap_err();
        let ConfigError::Validation { field, .. } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(field, "profiles.user_backup.name");
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[engine]\ntick_interval_secs = 0\n");
        assert!(matches!(
            load_config_from(&path),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn environment_overrides_the_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[engine]\ntick_interval_secs = 120\n")?;
            jail.set_env("TUNNELWARD_ENGINE__TICK_INTERVAL_SECS", "45");
            jail.set_env("TUNNELWARD_HOST__BUILD", "22621");
            let config = load_config_from(Path::new("config.toml"))
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(config.engine.tick_interval_secs, 45);
            assert_eq!(config.host.build, 22621);
            Ok(())
        });
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let original = load_config_from(&write(&dir, SAMPLE)).unwrap();

        let copy = dir.path().join("nested").join("copy.toml");
        save_config_to(&original, &copy).unwrap();
        assert_eq!(load_config_from(&copy).unwrap(), original);
    }
}
