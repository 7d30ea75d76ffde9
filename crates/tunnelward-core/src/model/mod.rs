// ── Profile model ──
//
// Value types for one VPN profile and its parts. Everything here is plain
// data with value equality; list-valued fields compare as sets.

pub mod common;
pub mod crypto;
pub mod dni;
pub mod filter;
pub mod managed;
pub mod profile;
pub mod route;
pub mod strategy;

// ── Re-exports ──────────────────────────────────────────────────────

pub use common::{AuthMethod, NativeProtocol, ProfileClass, ProfileSource, RoutingPolicy};
pub use crypto::{
    AuthenticationTransform, CipherTransform, CryptographySuite, DhGroup, EncryptionMethod,
    IntegrityCheckMethod, PfsGroup,
};
pub use dni::DomainNameInformation;
pub use filter::{AppId, FilterDirection, FilterError, PROTOCOL_TCP, PROTOCOL_UDP, TrafficFilter};
pub use managed::{ManagedProfile, RuntimeAttributes};
pub use profile::Profile;
pub use route::{Route, RouteError};
pub use strategy::{EntryOption, EntryOptions, VpnStrategy};
