// ── Connection manager ──
//
// Connection entries carry the OS-only properties the profile document
// cannot express (interface metric, negotiation strategy, option bitfields,
// outage timer). Active connections are enumerated and torn down here too.
//
// Option bitfields stay raw `u32`s at this boundary; the core crate wraps
// them in typed option sets.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::phonebook::PhonebookScope;

/// Opaque handle for an active connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// An active (or activating) connection as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveConnection {
    pub handle: ConnectionHandle,
    pub name: String,
    pub status: ConnectionStatus,
}

/// Raw connection-entry properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryProperties {
    pub ipv4_interface_metric: u32,
    pub ipv6_interface_metric: u32,
    pub vpn_strategy: u32,
    pub options: u32,
    pub options2: u32,
    /// Seconds the tunnel survives a network outage before dropping.
    pub network_outage_time: u32,
}

/// Per-connection proxy configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub server: Option<String>,
    #[serde(default)]
    pub exceptions: Vec<String>,
    #[serde(default)]
    pub bypass_local: bool,
}

pub trait ConnectionManager: Send + Sync {
    /// Names of every connection entry in the phonebook at `scope`.
    fn list_entries(&self, scope: PhonebookScope) -> Result<Vec<String>, Error>;

    /// Read entry properties. Missing entries are [`Error::NotFound`].
    fn get_entry(&self, scope: PhonebookScope, name: &str) -> Result<EntryProperties, Error>;

    fn set_entry(
        &self,
        scope: PhonebookScope,
        name: &str,
        properties: &EntryProperties,
    ) -> Result<(), Error>;

    /// Delete the entry. An entry held by an active or negotiating
    /// connection fails with [`Error::InUse`].
    fn delete_entry(&self, scope: PhonebookScope, name: &str) -> Result<(), Error>;

    fn get_proxy(&self, scope: PhonebookScope, name: &str) -> Result<ProxySettings, Error>;

    fn set_proxy(
        &self,
        scope: PhonebookScope,
        name: &str,
        settings: &ProxySettings,
    ) -> Result<(), Error>;

    fn list_active(&self) -> Result<Vec<ActiveConnection>, Error>;

    fn dial(&self, scope: PhonebookScope, name: &str) -> Result<ConnectionHandle, Error>;

    fn hangup(&self, handle: ConnectionHandle) -> Result<(), Error>;

    /// Current status of a handle. A handle the host no longer knows is
    /// reported as [`ConnectionStatus::Disconnected`].
    fn status(&self, handle: ConnectionHandle) -> Result<ConnectionStatus, Error>;
}
