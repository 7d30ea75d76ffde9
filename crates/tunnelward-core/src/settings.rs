// ── Desired profile settings ──
//
// Generator input: everything an administrator can configure for one tunnel
// class. Deserialized straight from a `[profiles.<class>]` table of the
// merged configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::Element;
use crate::model::{CryptographySuite, ProfileClass, RoutingPolicy, VpnStrategy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProfileSettings {
    pub class: ProfileClass,
    pub name: String,
    /// Server address(es), comma-separated.
    pub external_address: String,
    pub strategy: VpnStrategy,
    pub routing_policy: RoutingPolicy,

    pub always_on: bool,
    pub remember_credentials: bool,
    pub register_dns: bool,
    pub dns_suffixes: Vec<String>,
    pub trusted_networks: Vec<String>,
    /// Used to imply domain name information when none is configured.
    pub dns_servers: Vec<String>,
    pub domain_name_information: Vec<DniSetting>,

    /// CIDR → comment.
    pub include_routes: BTreeMap<String, String>,
    /// CIDR → comment.
    pub exclude_routes: BTreeMap<String, String>,
    /// Hostnames resolved into include routes on every generation.
    pub include_route_hostnames: Vec<String>,
    pub exclude_office365: bool,
    pub route_metric: Option<u32>,

    /// Filter name → filter.
    pub traffic_filters: BTreeMap<String, FilterSetting>,

    pub disable_advanced_options_edit_button: bool,
    pub disable_disconnect_button: bool,

    pub proxy_pac_url: Option<String>,
    pub proxy_server: Option<String>,
    pub proxy_exceptions: Vec<String>,
    pub proxy_bypass_local: bool,

    pub device_compliance: bool,
    pub device_compliance_sso_eku: Option<String>,
    pub device_compliance_sso_issuer_hashes: Vec<String>,

    pub custom_cryptography: bool,
    pub cryptography: CryptographySuite,

    pub eap: EapSettings,
    pub disable_class_based_default_route: bool,

    // ── Connection-entry attributes ──
    pub interface_metric: Option<u32>,
    pub mtu: Option<u32>,
    pub network_outage_time: Option<u32>,
    pub disable_credentials: bool,
    pub machine_eku_filter: Option<String>,

    /// A complete pre-built document. Skips generation.
    pub override_document: Option<String>,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            class: ProfileClass::User,
            name: String::new(),
            external_address: String::new(),
            strategy: VpnStrategy::Ikev2First,
            routing_policy: RoutingPolicy::SplitTunnel,
            always_on: true,
            remember_credentials: true,
            register_dns: false,
            dns_suffixes: Vec::new(),
            trusted_networks: Vec::new(),
            dns_servers: Vec::new(),
            domain_name_information: Vec::new(),
            include_routes: BTreeMap::new(),
            exclude_routes: BTreeMap::new(),
            include_route_hostnames: Vec::new(),
            exclude_office365: false,
            route_metric: None,
            traffic_filters: BTreeMap::new(),
            disable_advanced_options_edit_button: false,
            disable_disconnect_button: false,
            proxy_pac_url: None,
            proxy_server: None,
            proxy_exceptions: Vec::new(),
            proxy_bypass_local: false,
            device_compliance: false,
            device_compliance_sso_eku: None,
            device_compliance_sso_issuer_hashes: Vec::new(),
            custom_cryptography: false,
            cryptography: CryptographySuite::default(),
            eap: EapSettings::default(),
            disable_class_based_default_route: false,
            interface_metric: None,
            mtu: None,
            network_outage_time: None,
            disable_credentials: false,
            machine_eku_filter: None,
            override_document: None,
        }
    }
}

impl ProfileSettings {
    pub fn new(class: ProfileClass, name: impl Into<String>) -> Self {
        Self {
            class,
            name: name.into(),
            ..Self::default()
        }
    }
}

/// User-tunnel EAP (PEAP over TLS) options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EapSettings {
    /// SHA-1 thumbprints of trusted root/issuing CAs.
    pub trusted_root_thumbprints: Vec<String>,
    pub nps_servers: Vec<String>,
    pub disable_nps_validation: bool,
    /// Client-auth EKU to filter certificates on.
    pub eku_name: Option<String>,
    pub eku_oid: Option<String>,
    pub smart_card: bool,
    pub disable_crypto_binding: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DniSetting {
    pub domain: String,
    pub dns_servers: Vec<String>,
    pub web_proxy_servers: Vec<String>,
    pub auto_trigger: bool,
}

/// A configured traffic filter: either a legacy rule string or fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterSetting {
    Rule(String),
    Fields(FilterFields),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterFields {
    pub app: Option<String>,
    /// `TCP`, `UDP` or a protocol number.
    pub protocol: Option<String>,
    pub local_ports: Option<String>,
    pub remote_ports: Option<String>,
    pub local_addresses: Option<String>,
    pub remote_addresses: Option<String>,
    pub routing_policy: Option<String>,
    pub direction: Option<String>,
}

impl FilterFields {
    /// Document element for these fields, so configured filters go through
    /// the same canonicalization as installed ones.
    pub fn to_element(&self) -> Element {
        let mut el = Element::new("TrafficFilter");
        if let Some(app) = &self.app {
            el.push(Element::new("App").with(Element::text("Id", app.as_str())));
        }
        if let Some(protocol) = &self.protocol {
            let number = match protocol.trim().to_ascii_uppercase().as_str() {
                "TCP" => "6".to_owned(),
                "UDP" => "17".to_owned(),
                other => other.to_owned(),
            };
            el.push(Element::text("Protocol", number));
        }
        let optional = [
            ("LocalPortRanges", &self.local_ports),
            ("RemotePortRanges", &self.remote_ports),
            ("LocalAddressRanges", &self.local_addresses),
            ("RemoteAddressRanges", &self.remote_addresses),
            ("RoutingPolicyType", &self.routing_policy),
            ("Direction", &self.direction),
        ];
        for (name, value) in optional {
            if let Some(v) = value {
                el.push(Element::text(name, v.as_str()));
            }
        }
        el
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{FilterDirection, PROTOCOL_UDP, TrafficFilter};

    #[test]
    fn filter_setting_accepts_both_shapes() {
        let rule: FilterSetting = serde_json::from_str(r#""v2.30|Dir=Out|""#).unwrap();
        assert!(matches!(rule, FilterSetting::Rule(_)));

        let fields: FilterSetting =
            serde_json::from_str(r#"{"protocol":"udp","remote_ports":"53","direction":"Inbound"}"#)
                .unwrap();
        let FilterSetting::Fields(fields) = fields else {
            panic!("expected fields");
        };
        let filter = TrafficFilter::from_element(&fields.to_element());
        assert!(filter.valid);
        assert_eq!(filter.protocol, Some(PROTOCOL_UDP));
        assert_eq!(filter.direction, FilterDirection::Inbound);
    }

    #[test]
    fn defaults_are_always_on_user_tunnel() {
        let settings: ProfileSettings = serde_json::from_str(r#"{"name":"Corp"}"#).unwrap();
        assert_eq!(settings.class, ProfileClass::User);
        assert!(settings.always_on);
        assert_eq!(settings.strategy, VpnStrategy::Ikev2First);
    }
}
