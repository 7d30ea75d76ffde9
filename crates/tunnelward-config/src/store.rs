// ── Typed key/value access to configuration ──
//
// Keys are dotted paths into the merged TOML tree (`engine.tick_interval_secs`,
// `profiles.user.name`). Each read names the shape it wants through its
// default; a missing key or a value that cannot take that shape yields the
// default.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Serialize;
use strum::{Display, EnumString};
use toml::{Table, Value};
use tracing::debug;

use crate::{ConfigError, ENV_PREFIX};

/// Which configuration layer a read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Machine-wide settings.
    Machine,
    /// Per-user settings, falling back to the machine layer.
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::List(items) => f.write_str(&items.join(",")),
            Self::Map(map) => {
                let pairs: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
                f.write_str(&pairs.join(","))
            }
        }
    }
}

pub trait ConfigStore: Send + Sync {
    /// The value at `key` in `scope`, shaped like `default`.
    fn read(&self, key: &str, scope: Scope, default: ConfigValue) -> ConfigValue;
}

/// A [`ConfigStore`] over two parsed TOML layers.
#[derive(Debug, Clone, Default)]
pub struct FileConfigStore {
    machine: Table,
    user: Table,
}

impl FileConfigStore {
    pub fn new(machine: Table, user: Table) -> Self {
        Self { machine, user }
    }

    /// Machine layer from `machine` plus the environment; user layer from
    /// `user` alone. Missing files are empty layers.
    pub fn open(machine: &Path, user: Option<&Path>) -> Result<Self, ConfigError> {
        let machine: Table = Figment::new()
            .merge(Toml::file(machine))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        let user: Table = match user {
            Some(path) => Figment::from(Toml::file(path)).extract()?,
            None => Table::new(),
        };
        Ok(Self::new(machine, user))
    }

    fn lookup(&self, key: &str, scope: Scope) -> Option<&Value> {
        match scope {
            Scope::Machine => walk(&self.machine, key),
            Scope::User => walk(&self.user, key).or_else(|| walk(&self.machine, key)),
        }
    }
}

impl ConfigStore for FileConfigStore {
    fn read(&self, key: &str, scope: Scope, default: ConfigValue) -> ConfigValue {
        let Some(value) = self.lookup(key, scope) else {
            return default;
        };
        shape(value, &default).unwrap_or_else(|| {
            debug!(
                key,
                %scope,
                wanted = default.kind(),
                "config value has another shape; using default"
            );
            default
        })
    }
}

fn walk<'a>(table: &'a Table, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let mut value = table.get(parts.next()?)?;
    for part in parts {
        value = value.as_table()?.get(part)?;
    }
    Some(value)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Datetime(d) => Some(d.to_string()),
        Value::Array(_) | Value::Table(_) => None,
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Coerce `value` into the variant of `default`.
fn shape(value: &Value, default: &ConfigValue) -> Option<ConfigValue> {
    match default {
        ConfigValue::String(_) => scalar(value).map(ConfigValue::String),
        ConfigValue::Int(_) => match value {
            Value::Integer(i) => Some(ConfigValue::Int(*i)),
            Value::String(s) => s.trim().parse().ok().map(ConfigValue::Int),
            _ => None,
        },
        ConfigValue::Bool(_) => match value {
            Value::Boolean(b) => Some(ConfigValue::Bool(*b)),
            Value::Integer(0) => Some(ConfigValue::Bool(false)),
            Value::Integer(1) => Some(ConfigValue::Bool(true)),
            Value::String(s) => parse_bool(s).map(ConfigValue::Bool),
            _ => None,
        },
        ConfigValue::List(_) => match value {
            Value::Array(items) => items
                .iter()
                .map(scalar)
                .collect::<Option<Vec<_>>>()
                .map(ConfigValue::List),
            Value::String(s) => Some(ConfigValue::List(
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect(),
            )),
            _ => None,
        },
        ConfigValue::Map(_) => value.as_table().and_then(|table| {
            table
                .iter()
                .map(|(k, v)| scalar(v).map(|v| (k.clone(), v)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(ConfigValue::Map)
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MACHINE: &str = r#"
[engine]
tick_interval_secs = 300
allow_updates_while_connected = "yes"

[profiles.user]
name = "Contoso VPN"
dns_suffixes = ["corp.contoso.com", "contoso.com"]
include_routes = { "10.0.0.0/8" = "corp", "172.16.0.0/12" = "" }
"#;

    const USER: &str = r#"
[profiles.user]
name = "Contoso Personal"
"#;

    fn store() -> FileConfigStore {
        FileConfigStore::new(MACHINE.parse().unwrap(), USER.parse().unwrap())
    }

    fn text(s: &str) -> ConfigValue {
        ConfigValue::String(s.to_owned())
    }

    #[test]
    fn values_take_the_shape_of_the_default() {
        let store = store();
        assert_eq!(
            store.read("engine.tick_interval_secs", Scope::Machine, ConfigValue::Int(0)),
            ConfigValue::Int(300)
        );
        assert_eq!(
            store.read("engine.tick_interval_secs", Scope::Machine, text("")),
            text("300")
        );
        assert_eq!(
            store.read(
                "engine.allow_updates_while_connected",
                Scope::Machine,
                ConfigValue::Bool(false)
            ),
            ConfigValue::Bool(true)
        );
        assert_eq!(
            store.read("profiles.user.dns_suffixes", Scope::Machine, ConfigValue::List(vec![])),
            ConfigValue::List(vec!["corp.contoso.com".into(), "contoso.com".into()])
        );

        let routes = store.read(
            "profiles.user.include_routes",
            Scope::Machine,
            ConfigValue::Map(BTreeMap::new()),
        );
        let ConfigValue::Map(routes) = routes else {
            panic!("expected a map, got {routes:?}");
        };
        assert_eq!(routes.get("10.0.0.0/8").map(String::as_str), Some("corp"));
        assert_eq!(routes.len(), 2);
    }

    #[test]
    fn user_scope_overrides_then_falls_back() {
        let store = store();
        assert_eq!(
            store.read("profiles.user.name", Scope::User, text("")),
            text("Contoso Personal")
        );
        assert_eq!(
            store.read("profiles.user.name", Scope::Machine, text("")),
            text("Contoso VPN")
        );
        assert_eq!(
            store.read("engine.tick_interval_secs", Scope::User, ConfigValue::Int(0)),
            ConfigValue::Int(300)
        );
    }

    #[test]
    fn missing_or_mismatched_keys_yield_the_default() {
        let store = store();
        assert_eq!(
            store.read("engine.nope", Scope::Machine, ConfigValue::Int(7)),
            ConfigValue::Int(7)
        );
        // A table cannot become an int.
        assert_eq!(
            store.read("engine", Scope::Machine, ConfigValue::Int(7)),
            ConfigValue::Int(7)
        );
        // Walking through a scalar stops the lookup.
        assert_eq!(
            store.read("profiles.user.name.first", Scope::Machine, text("none")),
            text("none")
        );
    }

    #[test]
    fn comma_separated_strings_read_as_lists() {
        let store = FileConfigStore::new(
            "servers = \"a.contoso.com, b.contoso.com,\"".parse().unwrap(),
            Table::new(),
        );
        assert_eq!(
            store.read("servers", Scope::Machine, ConfigValue::List(vec![])),
            ConfigValue::List(vec!["a.contoso.com".into(), "b.contoso.com".into()])
        );
    }

    #[test]
    fn open_reads_both_layers_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let machine = dir.path().join("machine.toml");
        let user = dir.path().join("user.toml");
        std::fs::write(&machine, MACHINE).unwrap();
        std::fs::write(&user, USER).unwrap();

        let store = FileConfigStore::open(&machine, Some(&user)).unwrap();
        assert_eq!(
            store.read("profiles.user.name", Scope::User, text("")),
            text("Contoso Personal")
        );
        assert_eq!(
            store.read("profiles.user.name", Scope::Machine, text("")),
            text("Contoso VPN")
        );
    }

    #[test]
    fn scope_parses_case_insensitively() {
        assert_eq!("USER".parse::<Scope>().unwrap(), Scope::User);
        assert_eq!(Scope::Machine.to_string(), "machine");
    }
}
