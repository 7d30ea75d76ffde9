// ── Legacy phonebook store ──
//
// The phonebook is a single-writer key/value file. Each profile is one
// named section of `Key=Value` lines. Values the management bridge does not
// report reliably (device-tunnel flag, DNS registration, routes, traffic
// filters, compliance flags) are read from here.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which phonebook file a profile lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhonebookScope {
    /// Machine-wide phonebook (device tunnels).
    AllUsers,
    /// The interactive user's phonebook (user tunnels).
    CurrentUser,
}

/// One named section of a phonebook file.
///
/// Keys keep file order so a rewrite doesn't reshuffle the section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhonebookSection {
    values: IndexMap<String, String>,
}

impl PhonebookSection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// `1` is true, anything else (including a missing key) is false.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v.trim() == "1")
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, if value { "1" } else { "0" });
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PhonebookSection {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

pub trait PhonebookStore: Send + Sync {
    /// Names of every profile section in the phonebook at `scope`.
    fn list_profiles(&self, scope: PhonebookScope) -> Result<Vec<String>, Error>;

    /// Read a whole section, or `None` if the profile has no section.
    fn read_section(
        &self,
        scope: PhonebookScope,
        name: &str,
    ) -> Result<Option<PhonebookSection>, Error>;

    /// Set a single key inside an existing section.
    fn write_value(
        &self,
        scope: PhonebookScope,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_values_only_accept_one() {
        let section: PhonebookSection =
            [("A", "1"), ("B", "0"), ("C", "yes")].into_iter().collect();
        assert!(section.get_bool("A"));
        assert!(!section.get_bool("B"));
        assert!(!section.get_bool("C"));
        assert!(!section.get_bool("missing"));
    }

    #[test]
    fn set_preserves_insertion_order() {
        let mut section = PhonebookSection::new();
        section.set("Zeta", "1");
        section.set("Alpha", "2");
        section.set("Zeta", "3");
        let keys: Vec<&str> = section.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Zeta", "Alpha"]);
        assert_eq!(section.get_u32("Zeta"), Some(3));
    }
}
