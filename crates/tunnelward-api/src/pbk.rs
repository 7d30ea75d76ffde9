// ── File-backed phonebook ──
//
// Reads and rewrites `rasphone.pbk`-style files: `[Section]` headers
// followed by `Key=Value` lines. The whole file is re-read on every call so
// edits made by the OS between calls are always visible.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Error;
use crate::phonebook::{PhonebookScope, PhonebookSection, PhonebookStore};

/// Parsed phonebook contents, sections in file order.
pub type PhonebookFile = IndexMap<String, PhonebookSection>;

/// Parse phonebook text into its sections.
///
/// Blank lines and `;`/`#` comments are skipped. A key line before the
/// first section header is an error.
pub fn parse(text: &str) -> Result<PhonebookFile, Error> {
    let mut sections = PhonebookFile::new();
    let mut current: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            let name = header.strip_suffix(']').ok_or_else(|| Error::Phonebook {
                line: idx + 1,
                message: format!("unterminated section header '{line}'"),
            })?;
            sections.entry(name.to_owned()).or_default();
            current = Some(name.to_owned());
            continue;
        }

        let Some(section) = current.as_ref() else {
            return Err(Error::Phonebook {
                line: idx + 1,
                message: "key outside of any section".into(),
            });
        };
        let (key, value) = line.split_once('=').ok_or_else(|| Error::Phonebook {
            line: idx + 1,
            message: format!("expected Key=Value, got '{line}'"),
        })?;
        if let Some(entry) = sections.get_mut(section) {
            entry.set(key.trim(), value.trim());
        }
    }

    Ok(sections)
}

/// Render sections back to phonebook text.
pub fn render(sections: &PhonebookFile) -> String {
    let mut out = String::new();
    for (name, section) in sections {
        out.push('[');
        out.push_str(name);
        out.push_str("]\n");
        for (key, value) in section.iter() {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Phonebook store over two files on disk, one per scope.
pub struct FilePhonebook {
    all_users: PathBuf,
    current_user: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePhonebook {
    pub fn new(all_users: impl Into<PathBuf>, current_user: impl Into<PathBuf>) -> Self {
        Self {
            all_users: all_users.into(),
            current_user: current_user.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path(&self, scope: PhonebookScope) -> &Path {
        match scope {
            PhonebookScope::AllUsers => &self.all_users,
            PhonebookScope::CurrentUser => &self.current_user,
        }
    }

    fn load(&self, scope: PhonebookScope) -> Result<PhonebookFile, Error> {
        match fs::read_to_string(self.path(scope)) {
            Ok(text) => parse(&text),
            // A scope with no phonebook file simply has no profiles.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(PhonebookFile::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl PhonebookStore for FilePhonebook {
    fn list_profiles(&self, scope: PhonebookScope) -> Result<Vec<String>, Error> {
        Ok(self.load(scope)?.into_keys().collect())
    }

    fn read_section(
        &self,
        scope: PhonebookScope,
        name: &str,
    ) -> Result<Option<PhonebookSection>, Error> {
        Ok(self.load(scope)?.swap_remove(name))
    }

    fn write_value(
        &self,
        scope: PhonebookScope,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let _guard = self.write_lock.lock();
        let mut sections = self.load(scope)?;
        let section = sections
            .get_mut(name)
            .ok_or_else(|| Error::not_found("phonebook entry", name))?;
        section.set(key, value);
        fs::write(self.path(scope), render(&sections))?;
        debug!(profile = name, key, "phonebook value written");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "\
; generated
[Corp VPN]
DeviceTunnel=0
IpInterfaceMetric=3

[Corp Device]
DeviceTunnel=1
";

    #[test]
    fn parses_sections_in_order() {
        let sections = parse(SAMPLE).unwrap();
        let names: Vec<&String> = sections.keys().collect();
        assert_eq!(names, vec!["Corp VPN", "Corp Device"]);
        assert_eq!(sections["Corp VPN"].get_u32("IpInterfaceMetric"), Some(3));
        assert!(sections["Corp Device"].get_bool("DeviceTunnel"));
    }

    #[test]
    fn rejects_keys_before_header() {
        let err = parse("Orphan=1\n[A]\n").unwrap_err();
        assert!(matches!(err, Error::Phonebook { line: 1, .. }));
    }

    #[test]
    fn render_then_parse_keeps_values() {
        let sections = parse(SAMPLE).unwrap();
        let reparsed = parse(&render(&sections)).unwrap();
        assert_eq!(sections, reparsed);
    }

    #[test]
    fn write_value_updates_only_target_section() {
        let dir = tempfile::tempdir().unwrap();
        let all = dir.path().join("all.pbk");
        fs::write(&all, SAMPLE).unwrap();
        let store = FilePhonebook::new(&all, dir.path().join("user.pbk"));

        store
            .write_value(PhonebookScope::AllUsers, "Corp VPN", "IpInterfaceMetric", "15")
            .unwrap();

        let vpn = store
            .read_section(PhonebookScope::AllUsers, "Corp VPN")
            .unwrap()
            .unwrap();
        assert_eq!(vpn.get_u32("IpInterfaceMetric"), Some(15));
        let device = store
            .read_section(PhonebookScope::AllUsers, "Corp Device")
            .unwrap()
            .unwrap();
        assert!(device.get_bool("DeviceTunnel"));
    }

    #[test]
    fn missing_file_has_no_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePhonebook::new(dir.path().join("a.pbk"), dir.path().join("b.pbk"));
        assert!(store
            .list_profiles(PhonebookScope::CurrentUser)
            .unwrap()
            .is_empty());
        assert!(store
            .write_value(PhonebookScope::CurrentUser, "X", "K", "V")
            .unwrap_err()
            .is_not_found());
    }
}
