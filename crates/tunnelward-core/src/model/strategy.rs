// ── Negotiation strategy and entry option sets ──
//
// Both live on the connection entry rather than in the profile document.
// The host exposes them as raw integers; these types keep every
// add/remove/test operation total and named.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr, IntoEnumIterator};

use super::common::NativeProtocol;

/// Protocol negotiation order for a connection entry.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    FromRepr,
)]
#[repr(u32)]
#[strum(ascii_case_insensitive)]
pub enum VpnStrategy {
    #[default]
    Default = 0,
    PptpOnly = 1,
    PptpFirst = 2,
    L2tpOnly = 3,
    L2tpFirst = 4,
    SstpOnly = 5,
    SstpFirst = 6,
    Ikev2Only = 7,
    Ikev2First = 8,
    GreOnly = 9,
    PptpSstp = 12,
    L2tpSstp = 13,
    Ikev2Sstp = 14,
    ProtocolList = 15,
}

impl VpnStrategy {
    #[allow(clippy::as_conversions)]
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Strategies that negotiate SSTP at some point.
    pub fn is_sstp_based(self) -> bool {
        matches!(
            self,
            Self::SstpOnly | Self::SstpFirst | Self::PptpSstp | Self::L2tpSstp | Self::Ikev2Sstp
        )
    }

    /// Strategies the entry must never be set to: once written, the bridge
    /// can no longer read the profile back.
    pub fn is_rejected(self) -> bool {
        matches!(self, Self::PptpSstp | Self::L2tpSstp)
    }

    /// `NativeProtocolType` the document carries for this strategy.
    pub fn native_protocol(self) -> NativeProtocol {
        match self {
            Self::PptpOnly => NativeProtocol::Pptp,
            Self::L2tpOnly => NativeProtocol::L2tp,
            Self::SstpOnly => NativeProtocol::Sstp,
            Self::Ikev2Only => NativeProtocol::Ikev2,
            Self::ProtocolList => NativeProtocol::ProtocolList,
            Self::Default
            | Self::PptpFirst
            | Self::L2tpFirst
            | Self::SstpFirst
            | Self::Ikev2First
            | Self::GreOnly
            | Self::PptpSstp
            | Self::L2tpSstp
            | Self::Ikev2Sstp => NativeProtocol::Automatic,
        }
    }

    /// Parse a configured strategy: a name (`Ikev2Only`) or its numeric
    /// value (`7`).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        value
            .parse::<u32>()
            .ok()
            .and_then(Self::from_repr)
            .or_else(|| value.parse().ok())
    }
}

// ── Entry options ───────────────────────────────────────────────────

/// Named bits of the entry's second option word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum EntryOption {
    DontUseRasCredentials,
    RegisterIpWithDns,
    Ipv4ExplicitMetric,
    Ipv6ExplicitMetric,
    DisableClassBasedStaticRoute,
    DisableMobility,
    RequireMachineCertificates,
}

impl EntryOption {
    pub const fn bit(self) -> u32 {
        match self {
            Self::DontUseRasCredentials => 0x0000_0008,
            Self::RegisterIpWithDns => 0x0000_4000,
            Self::Ipv4ExplicitMetric => 0x0001_0000,
            Self::Ipv6ExplicitMetric => 0x0002_0000,
            Self::DisableClassBasedStaticRoute => 0x0008_0000,
            Self::DisableMobility => 0x0020_0000,
            Self::RequireMachineCertificates => 0x0040_0000,
        }
    }
}

/// Typed view over the option word. Bits without a name are carried
/// through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EntryOptions(u32);

impl EntryOptions {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn contains(self, option: EntryOption) -> bool {
        self.0 & option.bit() != 0
    }

    pub fn insert(&mut self, option: EntryOption) {
        self.0 |= option.bit();
    }

    pub fn remove(&mut self, option: EntryOption) {
        self.0 &= !option.bit();
    }

    pub fn set(&mut self, option: EntryOption, enabled: bool) {
        if enabled {
            self.insert(option);
        } else {
            self.remove(option);
        }
    }

    /// Named options currently set.
    pub fn iter(self) -> impl Iterator<Item = EntryOption> {
        EntryOption::iter().filter(move |o| self.contains(*o))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_names_and_numbers() {
        assert_eq!(VpnStrategy::parse("7"), Some(VpnStrategy::Ikev2Only));
        assert_eq!(VpnStrategy::parse("ikev2only"), Some(VpnStrategy::Ikev2Only));
        assert_eq!(VpnStrategy::parse("GreOnly"), Some(VpnStrategy::GreOnly));
        assert_eq!(VpnStrategy::parse("10"), None);
        assert_eq!(VpnStrategy::parse("Carrier pigeon"), None);
    }

    #[test]
    fn only_two_strategies_are_rejected() {
        let rejected: Vec<VpnStrategy> = VpnStrategy::iter().filter(|s| s.is_rejected()).collect();
        assert_eq!(rejected, vec![VpnStrategy::PptpSstp, VpnStrategy::L2tpSstp]);
    }

    #[test]
    fn options_preserve_unknown_bits() {
        let mut options = EntryOptions::from_raw(0x1 | EntryOption::DisableMobility.bit());
        assert!(options.contains(EntryOption::DisableMobility));
        options.remove(EntryOption::DisableMobility);
        options.set(EntryOption::Ipv4ExplicitMetric, true);
        assert_eq!(options.raw(), 0x1 | 0x0001_0000);
        assert_eq!(
            options.iter().collect::<Vec<_>>(),
            vec![EntryOption::Ipv4ExplicitMetric]
        );
    }
}
