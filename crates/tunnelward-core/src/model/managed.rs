// ── Runtime descriptor ──
//
// What the scheduler queues and the applier consumes: the document to
// install plus the OS-only attributes the document format cannot carry.

use serde::{Deserialize, Serialize};

use super::common::ProfileClass;
use super::profile::Profile;
use super::strategy::VpnStrategy;

/// Connection-entry attributes outside the profile document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeAttributes {
    pub interface_metric: Option<u32>,
    pub strategy: Option<VpnStrategy>,
    pub disable_credentials: bool,
    /// Seconds. `Some(0)` means "disable mobility" rather than a zero timer.
    pub network_outage_time: Option<u32>,
    pub mtu: Option<u32>,
    /// Device tunnels only.
    pub machine_eku_filter: Option<String>,
    pub proxy_exceptions: Vec<String>,
    pub proxy_bypass_local: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedProfile {
    pub name: String,
    pub class: ProfileClass,
    /// Profile document. Empty marks a delete tombstone.
    pub document: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub attributes: RuntimeAttributes,
    #[serde(default)]
    pub deployed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_profile_name: Option<String>,
}

impl ManagedProfile {
    pub fn new(
        name: impl Into<String>,
        class: ProfileClass,
        document: impl Into<String>,
        attributes: RuntimeAttributes,
    ) -> Self {
        let name = name.into();
        let document = document.into();
        let profile =
            (!document.trim().is_empty()).then(|| Profile::from_document(&name, &document));
        Self {
            name,
            class,
            document,
            profile,
            attributes,
            deployed: false,
            old_profile_name: None,
        }
    }

    /// A delete request for `name`.
    pub fn tombstone(name: impl Into<String>, class: ProfileClass) -> Self {
        Self::new(name, class, String::new(), RuntimeAttributes::default())
    }

    pub fn renamed_from(mut self, old_name: impl Into<String>) -> Self {
        self.old_profile_name = Some(old_name.into());
        self
    }

    /// Tombstones are deletes whatever else is set.
    pub fn is_tombstone(&self) -> bool {
        self.document.trim().is_empty()
    }

    /// The desired profile, parsing the document if it was not kept.
    pub fn desired(&self) -> Option<Profile> {
        if self.is_tombstone() {
            return None;
        }
        Some(
            self.profile
                .clone()
                .unwrap_or_else(|| Profile::from_document(&self.name, &self.document)),
        )
    }

    /// Proxy server configured in the document, if any.
    pub fn proxy_server(&self) -> Option<&str> {
        self.profile.as_ref().and_then(|p| p.proxy_server.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_a_tombstone_even_with_attributes() {
        let mut update = ManagedProfile::tombstone("Corp", ProfileClass::User);
        update.attributes.mtu = Some(1400);
        assert!(update.is_tombstone());
        assert!(update.desired().is_none());

        let whitespace = ManagedProfile::new(
            "Corp",
            ProfileClass::User,
            "  \n",
            RuntimeAttributes::default(),
        );
        assert!(whitespace.is_tombstone());
    }

    #[test]
    fn document_is_parsed_on_construction() {
        let update = ManagedProfile::new(
            "Corp",
            ProfileClass::User,
            "<VPNProfile><AlwaysOn>true</AlwaysOn><Proxy><Manual><Server>p:80</Server></Manual></Proxy></VPNProfile>",
            RuntimeAttributes::default(),
        );
        assert!(update.desired().is_some_and(|p| p.always_on));
        assert_eq!(update.proxy_server(), Some("p:80"));
    }
}
