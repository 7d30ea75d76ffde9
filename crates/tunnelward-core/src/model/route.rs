// ── Routes ──
//
// A route arrives either as a `<Route>` document element or as a fixed
// 72-hex-character phonebook record. The record is nine 4-byte groups:
//
//   metric | type | prefix | address[0..4] .. address[12..16] | exclusion | reserved
//
// Numeric groups are little-endian dwords (type 2 = IPv4, 23 = IPv6). The
// address bytes are stored in network order. Exclusion is the low byte of a
// little-endian dword.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::Element;

const RECORD_HEX_LEN: usize = 72;
const TYPE_IPV4: u32 = 2;
const TYPE_IPV6: u32 = 23;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route record must be {RECORD_HEX_LEN} hex characters, got {0}")]
    WrongLength(usize),

    #[error("route record is not valid hex")]
    NotHex,

    #[error("unknown address type tag {0}")]
    UnknownType(u32),

    #[error("prefix length {prefix} out of range for {address}")]
    InvalidPrefix { address: IpAddr, prefix: u32 },

    #[error("invalid route address '{0}'")]
    InvalidAddress(String),

    #[error("invalid route metric '{0}'")]
    InvalidMetric(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub address: IpAddr,
    pub prefix: u8,
    #[serde(default = "default_metric")]
    pub metric: u32,
    #[serde(default)]
    pub exclusion: bool,
    /// Free-form label from configuration. Not part of equality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

fn default_metric() -> u32 {
    1
}

fn max_prefix(address: IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Zero the host bits of `address` beyond `prefix`.
pub(crate) fn network(address: IpAddr, prefix: u8) -> IpAddr {
    match address {
        IpAddr::V4(v4) => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
        }
        IpAddr::V6(v6) => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
        }
    }
}

/// Parse `a.b.c.d/n` (or a bare address) into a normalized network.
pub(crate) fn parse_network(text: &str) -> Result<(IpAddr, u8), RouteError> {
    let text = text.trim();
    let (addr, prefix) = match text.split_once('/') {
        Some((a, p)) => (a.trim(), Some(p.trim())),
        None => (text, None),
    };
    let address: IpAddr = addr
        .parse()
        .map_err(|_| RouteError::InvalidAddress(text.to_owned()))?;
    let max = max_prefix(address);
    let prefix = match prefix {
        Some(p) => {
            let value: u32 = p
                .parse()
                .map_err(|_| RouteError::InvalidAddress(text.to_owned()))?;
            u8::try_from(value)
                .ok()
                .filter(|v| *v <= max)
                .ok_or(RouteError::InvalidPrefix {
                    address,
                    prefix: value,
                })?
        }
        None => max,
    };
    Ok((network(address, prefix), prefix))
}

impl Route {
    pub fn new(address: IpAddr, prefix: u8) -> Self {
        Self {
            address: network(address, prefix),
            prefix,
            metric: default_metric(),
            exclusion: false,
            comment: None,
        }
    }

    pub fn parse_cidr(text: &str) -> Result<Self, RouteError> {
        let (address, prefix) = parse_network(text)?;
        Ok(Self::new(address, prefix))
    }

    pub fn excluded(mut self) -> Self {
        self.exclusion = true;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn is_ipv4(&self) -> bool {
        self.address.is_ipv4()
    }

    // ── Phonebook record ─────────────────────────────────────────────

    pub fn decode_record(record: &str) -> Result<Self, RouteError> {
        let record = record.trim();
        if record.len() != RECORD_HEX_LEN {
            return Err(RouteError::WrongLength(record.len()));
        }
        let bytes = hex::decode(record).map_err(|_| RouteError::NotHex)?;
        let word = |i: usize| -> [u8; 4] {
            let mut w = [0u8; 4];
            w.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            w
        };

        let metric = u32::from_le_bytes(word(0));
        let kind = u32::from_le_bytes(word(1));
        let mask = u32::from_le_bytes(word(2));
        let address = match kind {
            TYPE_IPV4 => IpAddr::V4(Ipv4Addr::from(word(3))),
            TYPE_IPV6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&bytes[12..28]);
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            other => return Err(RouteError::UnknownType(other)),
        };
        let prefix = u8::try_from(mask)
            .ok()
            .filter(|p| *p <= max_prefix(address))
            .ok_or(RouteError::InvalidPrefix {
                address,
                prefix: mask,
            })?;
        let exclusion = word(7)[0] != 0;

        Ok(Self {
            address: network(address, prefix),
            prefix,
            metric,
            exclusion,
            comment: None,
        })
    }

    pub fn encode_record(&self) -> String {
        let mut bytes = Vec::with_capacity(RECORD_HEX_LEN / 2);
        bytes.extend_from_slice(&self.metric.to_le_bytes());
        let (kind, octets) = match self.address {
            IpAddr::V4(v4) => {
                let mut octets = [0u8; 16];
                octets[..4].copy_from_slice(&v4.octets());
                (TYPE_IPV4, octets)
            }
            IpAddr::V6(v6) => (TYPE_IPV6, v6.octets()),
        };
        bytes.extend_from_slice(&kind.to_le_bytes());
        bytes.extend_from_slice(&u32::from(self.prefix).to_le_bytes());
        bytes.extend_from_slice(&octets);
        bytes.extend_from_slice(&u32::from(self.exclusion).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        hex::encode_upper(bytes)
    }

    // ── Document element ─────────────────────────────────────────────

    pub fn from_element(element: &Element) -> Result<Self, RouteError> {
        let address = element.child_text("Address").unwrap_or_default();
        let mut route = match element.child_text("PrefixSize") {
            Some(prefix) => Self::parse_cidr(&format!("{address}/{prefix}"))?,
            None => Self::parse_cidr(address)?,
        };
        if let Some(metric) = element.child_text("Metric") {
            route.metric = metric
                .parse()
                .map_err(|_| RouteError::InvalidMetric(metric.to_owned()))?;
        }
        route.exclusion = element
            .child_text("ExclusionRoute")
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
        Ok(route)
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("Route")
            .with(Element::text("Address", self.address.to_string()))
            .with(Element::text("PrefixSize", self.prefix.to_string()));
        if self.exclusion {
            el.push(Element::flag("ExclusionRoute", true));
        }
        el.with(Element::text("Metric", self.metric.to_string()))
    }

    fn key(&self) -> (IpAddr, u8, u32, bool) {
        (self.address, self.prefix, self.metric, self.exclusion)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)?;
        if self.exclusion {
            f.write_str(" (excluded)")?;
        }
        if self.metric != default_metric() {
            write!(f, " metric {}", self.metric)?;
        }
        Ok(())
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Route {}

impl Hash for Route {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Route {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Route {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}
