// ── Traffic filters ──
//
// A traffic filter restricts which traffic enters the tunnel. It arrives
// either as a `<TrafficFilter>` document element or as a legacy
// pipe-delimited rule string from the phonebook:
//
//   v2.30|Action=Allow|Dir=Out|Protocol=6|RPort=443|RA4=10.0.0.0/8|App=C:\x.exe|
//
// Repeated keys in a rule string are comma-appended. Port and address
// lists are canonicalized (sorted, de-duplicated, network-normalized) so two
// representations listing the same values in different orders compare
// equal.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use super::common::RoutingPolicy;
use super::route::parse_network;
use crate::document::Element;

const RULE_VERSION: &str = "v2.30";

pub const PROTOCOL_TCP: u8 = 6;
pub const PROTOCOL_UDP: u8 = 17;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("rule string has no Dir key")]
    MissingDirection,

    #[error("unknown direction '{0}'")]
    InvalidDirection(String),

    #[error("malformed rule token '{0}'")]
    MalformedToken(String),

    #[error("invalid protocol '{0}'")]
    InvalidProtocol(String),
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum FilterDirection {
    #[default]
    Outbound,
    Inbound,
}

/// Application a filter is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppId {
    /// Executable path, or `SYSTEM` for kernel-mode traffic.
    Path(String),
    /// Packaged app family name (`Name_publisherhash`).
    PackageFamily(String),
}

impl AppId {
    /// Classify an `<App><Id>` value.
    pub fn classify(id: &str) -> Self {
        let id = id.trim();
        if id.contains('\\') || id.contains('/') || id.eq_ignore_ascii_case("SYSTEM") {
            Self::Path(id.to_owned())
        } else {
            Self::PackageFamily(id.to_owned())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Path(p) | Self::PackageFamily(p) => p,
        }
    }

    /// Whether the identifier is syntactically plausible.
    pub fn is_well_formed(&self) -> bool {
        match self {
            Self::Path(p) => {
                p.eq_ignore_ascii_case("SYSTEM")
                    || (p.len() > 3
                        && !p.contains(['*', '?', '"', '<', '>', '|'])
                        && (p.starts_with('%') || p.chars().nth(1) == Some(':')))
            }
            Self::PackageFamily(pfn) => match pfn.rsplit_once('_') {
                Some((name, publisher)) => {
                    !name.is_empty()
                        && name
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
                        && publisher.len() == 13
                        && publisher
                            .chars()
                            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                }
                None => false,
            },
        }
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficFilter {
    pub app_id: Option<AppId>,
    pub protocol: Option<u8>,
    pub local_ports: Vec<String>,
    pub remote_ports: Vec<String>,
    pub local_addresses: Vec<String>,
    pub remote_addresses: Vec<String>,
    pub routing_policy: Option<RoutingPolicy>,
    pub direction: FilterDirection,
    pub valid: bool,
    /// Why `valid` is false. Not part of equality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

impl PartialEq for TrafficFilter {
    fn eq(&self, other: &Self) -> bool {
        self.app_id == other.app_id
            && self.protocol == other.protocol
            && self.local_ports == other.local_ports
            && self.remote_ports == other.remote_ports
            && self.local_addresses == other.local_addresses
            && self.remote_addresses == other.remote_addresses
            && self.routing_policy == other.routing_policy
            && self.direction == other.direction
            && self.valid == other.valid
    }
}

impl Eq for TrafficFilter {}

// ── Canonicalization ─────────────────────────────────────────────────

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn parse_port(text: &str) -> Option<u16> {
    text.trim().parse().ok()
}

/// Canonical port list: `N` or `N-M`, numerically sorted, de-duplicated.
pub fn canonical_ports(raw: &str) -> Result<Vec<String>, String> {
    let mut ranges: Vec<(u16, u16)> = Vec::new();
    for token in split_list(raw) {
        let range = match token.split_once('-') {
            Some((a, b)) => match (parse_port(a), parse_port(b)) {
                (Some(a), Some(b)) if a <= b => (a, b),
                _ => return Err(format!("invalid port range '{token}'")),
            },
            None => match parse_port(token) {
                Some(p) => (p, p),
                None => return Err(format!("invalid port '{token}'")),
            },
        };
        ranges.push(range);
    }
    ranges.sort_unstable();
    ranges.dedup();
    Ok(ranges
        .into_iter()
        .map(|(a, b)| {
            if a == b {
                a.to_string()
            } else {
                format!("{a}-{b}")
            }
        })
        .collect())
}

/// Canonical address list: CIDRs network-normalized, single addresses as
/// `/32` or `/128`, `a-b` ranges kept as written. Sorted, de-duplicated.
pub fn canonical_addresses(raw: &str) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    for token in split_list(raw) {
        let canonical = match token.split_once('-') {
            Some((a, b)) => {
                let a: std::net::IpAddr = a
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid address range '{token}'"))?;
                let b: std::net::IpAddr = b
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid address range '{token}'"))?;
                format!("{a}-{b}")
            }
            None => {
                let (address, prefix) = parse_network(token).map_err(|e| e.to_string())?;
                format!("{address}/{prefix}")
            }
        };
        out.push(canonical);
    }
    out.sort();
    out.dedup();
    Ok(out)
}

// ── Construction ─────────────────────────────────────────────────────

#[derive(Default)]
struct FilterBuilder {
    filter: TrafficFilter,
    issues: Vec<String>,
}

impl FilterBuilder {
    fn ports(&mut self, raw: &str) -> Vec<String> {
        canonical_ports(raw).unwrap_or_else(|e| {
            self.issues.push(e);
            split_list(raw).map(str::to_owned).collect()
        })
    }

    fn addresses(&mut self, raw: &str) -> Vec<String> {
        canonical_addresses(raw).unwrap_or_else(|e| {
            self.issues.push(e);
            split_list(raw).map(str::to_owned).collect()
        })
    }

    fn finish(mut self) -> TrafficFilter {
        if let Some(app) = &self.filter.app_id {
            if !app.is_well_formed() {
                self.issues.push(format!("invalid app id '{app}'"));
            }
        }
        self.filter.valid = self.issues.is_empty();
        self.filter.issue = (!self.issues.is_empty()).then(|| self.issues.join("; "));
        self.filter
    }
}

impl TrafficFilter {
    /// Build from a `<TrafficFilter>` element. Bad values mark the filter
    /// invalid instead of failing.
    pub fn from_element(element: &Element) -> Self {
        let mut b = FilterBuilder::default();
        b.filter.app_id = element
            .child("App")
            .and_then(|app| app.child_text("Id"))
            .map(AppId::classify);
        if let Some(p) = element.child_text("Protocol") {
            match p.parse() {
                Ok(p) => b.filter.protocol = Some(p),
                Err(_) => b.issues.push(format!("invalid protocol '{p}'")),
            }
        }
        if let Some(raw) = element.child_text("LocalPortRanges") {
            b.filter.local_ports = b.ports(raw);
        }
        if let Some(raw) = element.child_text("RemotePortRanges") {
            b.filter.remote_ports = b.ports(raw);
        }
        if let Some(raw) = element.child_text("LocalAddressRanges") {
            b.filter.local_addresses = b.addresses(raw);
        }
        if let Some(raw) = element.child_text("RemoteAddressRanges") {
            b.filter.remote_addresses = b.addresses(raw);
        }
        if let Some(policy) = element.child_text("RoutingPolicyType") {
            match policy.parse() {
                Ok(p) => b.filter.routing_policy = Some(p),
                Err(_) => b.issues.push(format!("invalid routing policy '{policy}'")),
            }
        }
        if let Some(dir) = element.child_text("Direction") {
            match dir.parse() {
                Ok(d) => b.filter.direction = d,
                Err(_) => b.issues.push(format!("invalid direction '{dir}'")),
            }
        }
        b.finish()
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("TrafficFilter");
        if let Some(app) = &self.app_id {
            el.push(Element::new("App").with(Element::text("Id", app.as_str())));
        }
        if let Some(p) = self.protocol {
            el.push(Element::text("Protocol", p.to_string()));
        }
        let lists = [
            ("LocalPortRanges", &self.local_ports),
            ("RemotePortRanges", &self.remote_ports),
            ("LocalAddressRanges", &self.local_addresses),
            ("RemoteAddressRanges", &self.remote_addresses),
        ];
        for (name, values) in lists {
            if !values.is_empty() {
                el.push(Element::text(name, values.join(",")));
            }
        }
        if let Some(policy) = self.routing_policy {
            el.push(Element::text("RoutingPolicyType", policy.to_string()));
        }
        el.with(Element::text("Direction", self.direction.to_string()))
    }

    /// Decode a legacy rule string. A string without `Dir` cannot be
    /// attributed to a direction and is rejected outright.
    pub fn from_rule_string(rule: &str) -> Result<Self, FilterError> {
        let mut values: Vec<(&str, String)> = Vec::new();
        for token in rule.split('|').map(str::trim).filter(|t| !t.is_empty()) {
            if token.starts_with('v') && !token.contains('=') {
                continue;
            }
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| FilterError::MalformedToken(token.to_owned()))?;
            match values.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => {
                    existing.push(',');
                    existing.push_str(value);
                }
                None => values.push((key, value.to_owned())),
            }
        }
        let get = |key: &str| {
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };

        let direction = match get("Dir") {
            Some("Out") => FilterDirection::Outbound,
            Some("In") => FilterDirection::Inbound,
            Some(other) => return Err(FilterError::InvalidDirection(other.to_owned())),
            None => return Err(FilterError::MissingDirection),
        };

        let mut b = FilterBuilder::default();
        b.filter.direction = direction;
        if let Some(p) = get("Protocol") {
            b.filter.protocol = Some(
                p.trim()
                    .parse()
                    .map_err(|_| FilterError::InvalidProtocol(p.to_owned()))?,
            );
        }
        if let Some(raw) = get("LPort") {
            b.filter.local_ports = b.ports(raw);
        }
        if let Some(raw) = get("RPort") {
            b.filter.remote_ports = b.ports(raw);
        }
        let joined = |a: Option<&str>, c: Option<&str>| -> Option<String> {
            match (a, c) {
                (None, None) => None,
                (a, c) => Some(format!("{},{}", a.unwrap_or(""), c.unwrap_or(""))),
            }
        };
        if let Some(raw) = joined(get("LA4"), get("LA6")) {
            b.filter.local_addresses = b.addresses(&raw);
        }
        if let Some(raw) = joined(get("RA4"), get("RA6")) {
            b.filter.remote_addresses = b.addresses(&raw);
        }
        b.filter.app_id = get("App")
            .map(|p| AppId::Path(p.trim().to_owned()))
            .or_else(|| get("PFN").map(|p| AppId::PackageFamily(p.trim().to_owned())));
        if let Some(policy) = get("Policy") {
            match policy.trim() {
                "Split" => b.filter.routing_policy = Some(RoutingPolicy::SplitTunnel),
                "Force" => b.filter.routing_policy = Some(RoutingPolicy::ForceTunnel),
                other => b.issues.push(format!("invalid routing policy '{other}'")),
            }
        }
        Ok(b.finish())
    }

    /// Encode as a legacy rule string.
    pub fn to_rule_string(&self) -> String {
        let mut parts = vec![RULE_VERSION.to_owned(), "Action=Allow".to_owned()];
        parts.push(match self.direction {
            FilterDirection::Outbound => "Dir=Out".to_owned(),
            FilterDirection::Inbound => "Dir=In".to_owned(),
        });
        if let Some(p) = self.protocol {
            parts.push(format!("Protocol={p}"));
        }
        if !self.local_ports.is_empty() {
            parts.push(format!("LPort={}", self.local_ports.join(",")));
        }
        if !self.remote_ports.is_empty() {
            parts.push(format!("RPort={}", self.remote_ports.join(",")));
        }
        let families = [
            ("LA4", "LA6", &self.local_addresses),
            ("RA4", "RA6", &self.remote_addresses),
        ];
        for (v4, v6, addresses) in families {
            let (six, four): (Vec<&String>, Vec<&String>) =
                addresses.iter().partition(|a| a.contains(':'));
            if !four.is_empty() {
                parts.push(format!("{v4}={}", join(&four)));
            }
            if !six.is_empty() {
                parts.push(format!("{v6}={}", join(&six)));
            }
        }
        match &self.app_id {
            Some(AppId::Path(p)) => parts.push(format!("App={p}")),
            Some(AppId::PackageFamily(p)) => parts.push(format!("PFN={p}")),
            None => {}
        }
        match self.routing_policy {
            Some(RoutingPolicy::SplitTunnel) => parts.push("Policy=Split".to_owned()),
            Some(RoutingPolicy::ForceTunnel) => parts.push("Policy=Force".to_owned()),
            None => {}
        }
        let mut rule = parts.join("|");
        rule.push('|');
        rule
    }

    /// Whether the filter constrains anything at all.
    pub fn has_effect(&self) -> bool {
        self.app_id.is_some()
            || self.protocol.is_some()
            || !self.local_ports.is_empty()
            || !self.remote_ports.is_empty()
            || !self.local_addresses.is_empty()
            || !self.remote_addresses.is_empty()
    }

    pub fn has_ports(&self) -> bool {
        !self.local_ports.is_empty() || !self.remote_ports.is_empty()
    }
}

impl fmt::Display for TrafficFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rule_string())
    }
}

fn join(values: &[&String]) -> String {
    values
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
