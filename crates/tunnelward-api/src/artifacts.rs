// ── Side-artifact stores ──
//
// Deleting a profile leaves records behind in stores that have nothing to
// do with the phonebook: tracked-resource counters, network-profile name
// bindings, and the auto-trigger-disabled list. All are keyed by profile
// name.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A reference-counted resource record owned by a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedResource {
    pub key: String,
    pub profile: String,
    pub count: u32,
}

/// A network-profile record bound to a VPN profile by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkBinding {
    pub id: String,
    pub profile: String,
}

pub trait ArtifactStore: Send + Sync {
    fn tracked_resources(&self) -> Result<Vec<TrackedResource>, Error>;

    fn set_tracked_count(&self, key: &str, count: u32) -> Result<(), Error>;

    fn remove_tracked(&self, key: &str) -> Result<(), Error>;

    fn network_bindings(&self) -> Result<Vec<NetworkBinding>, Error>;

    fn remove_network_binding(&self, id: &str) -> Result<(), Error>;

    /// Profiles for which the user switched auto-trigger off.
    fn auto_trigger_disabled(&self) -> Result<Vec<String>, Error>;

    fn set_auto_trigger_disabled(&self, profiles: &[String]) -> Result<(), Error>;
}
