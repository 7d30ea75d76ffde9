// ── Shared model enums ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tunnelward_api::PhonebookScope;

/// Tunnel class a profile is managed under.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProfileClass {
    /// Device tunnel, established before user sign-in.
    Machine,
    User,
    UserBackup,
}

impl ProfileClass {
    pub fn is_device_tunnel(self) -> bool {
        matches!(self, Self::Machine)
    }

    /// Phonebook the class's connection entry lives in.
    pub fn scope(self) -> PhonebookScope {
        match self {
            Self::Machine => PhonebookScope::AllUsers,
            Self::User | Self::UserBackup => PhonebookScope::CurrentUser,
        }
    }
}

/// Which representation a [`Profile`](super::Profile) was rebuilt from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ProfileSource {
    /// Desired-state document.
    #[default]
    Desired,
    /// Document reported by the management bridge.
    Bridge,
    /// Bridge document overlaid with phonebook-only values.
    Merged,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum RoutingPolicy {
    /// Only listed routes go through the tunnel.
    #[default]
    SplitTunnel,
    ForceTunnel,
}

/// `NativeProtocolType` as written in the document.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum NativeProtocol {
    #[strum(serialize = "PPTP")]
    Pptp,
    #[strum(serialize = "L2TP")]
    L2tp,
    #[strum(serialize = "IKEv2")]
    Ikev2,
    #[strum(serialize = "SSTP")]
    Sstp,
    #[default]
    Automatic,
    ProtocolList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum AuthMethod {
    /// `<UserMethod>Eap</UserMethod>`
    Eap,
    /// `<MachineMethod>Certificate</MachineMethod>`
    MachineCertificate,
}
