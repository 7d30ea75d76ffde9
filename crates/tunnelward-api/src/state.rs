// ── Persisted reconciliation state ──
//
// Records which profile name is currently managed for each tunnel class so
// a restarted process can resume reconciliation without re-deriving it.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub trait StateStore: Send + Sync {
    fn load_managed(&self, class: &str) -> Result<Option<String>, Error>;

    fn save_managed(&self, class: &str, name: &str) -> Result<(), Error>;

    fn clear_managed(&self, class: &str) -> Result<(), Error>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManagedRecord {
    name: String,
    updated_at: DateTime<Utc>,
}

/// JSON-file state store.
pub struct FileStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<BTreeMap<String, ManagedRecord>, Error> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, records: &BTreeMap<String, ManagedRecord>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(records)?)?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn load_managed(&self, class: &str) -> Result<Option<String>, Error> {
        let _guard = self.lock.lock();
        Ok(self.read()?.remove(class).map(|r| r.name))
    }

    fn save_managed(&self, class: &str, name: &str) -> Result<(), Error> {
        let _guard = self.lock.lock();
        let mut records = self.read()?;
        records.insert(
            class.to_owned(),
            ManagedRecord {
                name: name.to_owned(),
                updated_at: Utc::now(),
            },
        );
        self.write(&records)
    }

    fn clear_managed(&self, class: &str) -> Result<(), Error> {
        let _guard = self.lock.lock();
        let mut records = self.read()?;
        if records.remove(class).is_some() {
            self.write(&records)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("state").join("managed.json"));

        assert_eq!(store.load_managed("user").unwrap(), None);
        store.save_managed("user", "Corp VPN").unwrap();
        store.save_managed("machine", "Corp Device").unwrap();
        assert_eq!(store.load_managed("user").unwrap().as_deref(), Some("Corp VPN"));

        store.clear_managed("user").unwrap();
        assert_eq!(store.load_managed("user").unwrap(), None);
        assert_eq!(
            store.load_managed("machine").unwrap().as_deref(),
            Some("Corp Device")
        );
    }
}
