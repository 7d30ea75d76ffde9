// ── Management bridge ──
//
// The bridge exposes installed VPN profiles as structured documents. It is
// the authoritative write path: profiles are created by handing it a full
// document, and it reports back whatever the OS currently holds.

use uuid::Uuid;

use crate::error::Error;

pub trait ProfileBridge: Send + Sync {
    /// Install a profile document under `name`.
    fn create(&self, name: &str, document: &str) -> Result<(), Error>;

    /// Fetch the installed document for `name`, or `None` when no profile
    /// with that name exists.
    fn get(&self, name: &str) -> Result<Option<String>, Error>;

    /// Interface GUID the OS assigned to the profile's adapter.
    fn guid(&self, name: &str) -> Result<Option<Uuid>, Error>;
}
