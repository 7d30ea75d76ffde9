// ── Profile aggregate ──
//
// One logical VPN profile, rebuilt from whichever representation is at
// hand: the desired-state document, the document the bridge reports, or the
// bridge document overlaid with values only the phonebook carries. All
// three share one equality contract so they can be compared directly.
//
// Parsing never fails. Problems accumulate in `load_error` and the profile
// keeps every value that could be read.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tunnelward_api::PhonebookSection;

use super::common::{AuthMethod, NativeProtocol, ProfileSource, RoutingPolicy};
use super::crypto::CryptographySuite;
use super::dni::DomainNameInformation;
use super::filter::TrafficFilter;
use super::route::Route;
use crate::document::{self, DocumentError, Element};
use crate::phonebook::PhonebookOverlay;

pub const ROOT: &str = "VPNProfile";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Profile {
    pub name: String,
    pub source: ProfileSource,

    pub always_on: bool,
    /// Reported by the phonebook; mirrors `always_on` for document sources.
    pub always_on_capable: bool,
    pub remember_credentials: bool,
    pub dns_suffixes: Vec<String>,
    pub trusted_networks: Vec<String>,
    pub disable_advanced_options_edit_button: bool,
    pub disable_disconnect_button: bool,
    pub device_tunnel: bool,
    pub register_dns: bool,

    pub proxy_pac_url: Option<String>,
    pub proxy_server: Option<String>,

    pub device_compliance_enabled: bool,
    pub device_compliance_sso_enabled: bool,
    pub device_compliance_sso_eku: Option<String>,
    pub device_compliance_sso_issuer_hash: Vec<String>,

    pub domain_name_information: Vec<DomainNameInformation>,
    pub traffic_filters: Vec<TrafficFilter>,

    // ── NativeProfile ──
    pub servers: Vec<String>,
    pub routing_policy: RoutingPolicy,
    pub native_protocol: NativeProtocol,
    pub cryptography_suite: Option<CryptographySuite>,
    pub auth_method: Option<AuthMethod>,
    /// Compact canonical XML of the EAP `<Configuration>` body.
    pub eap_configuration: Option<String>,
    pub disable_class_based_default_route: bool,

    pub routes: Vec<Route>,

    /// Everything that went wrong while rebuilding this profile. Not part
    /// of equality.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub load_error: String,
}

/// Set equality: same distinct members, ignoring order and repeats.
pub(crate) fn same_set<T: PartialEq>(a: &[T], b: &[T]) -> bool {
    a.iter().all(|x| b.contains(x)) && b.iter().all(|y| a.contains(y))
}

fn split_names(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = raw
        .split([',', ';'])
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn read_bool(parent: &Element, name: &str, errors: &mut Vec<String>) -> Option<bool> {
    let text = parent.child_text(name)?;
    if text.eq_ignore_ascii_case("true") || text == "1" {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") || text == "0" {
        Some(false)
    } else {
        errors.push(format!("{name}: expected true/false, got '{text}'"));
        None
    }
}

fn read_enum<T: std::str::FromStr>(
    parent: &Element,
    name: &str,
    errors: &mut Vec<String>,
) -> Option<T> {
    let text = parent.child_text(name)?;
    match text.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            errors.push(format!("{name}: unknown value '{text}'"));
            None
        }
    }
}

impl Profile {
    /// Untouched baseline for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: ProfileSource::Desired,
            always_on: false,
            always_on_capable: false,
            remember_credentials: false,
            dns_suffixes: Vec::new(),
            trusted_networks: Vec::new(),
            disable_advanced_options_edit_button: false,
            disable_disconnect_button: false,
            device_tunnel: false,
            register_dns: false,
            proxy_pac_url: None,
            proxy_server: None,
            device_compliance_enabled: false,
            device_compliance_sso_enabled: false,
            device_compliance_sso_eku: None,
            device_compliance_sso_issuer_hash: Vec::new(),
            domain_name_information: Vec::new(),
            traffic_filters: Vec::new(),
            servers: Vec::new(),
            routing_policy: RoutingPolicy::default(),
            native_protocol: NativeProtocol::default(),
            cryptography_suite: None,
            auth_method: None,
            eap_configuration: None,
            disable_class_based_default_route: false,
            routes: Vec::new(),
            load_error: String::new(),
        }
    }

    // ── Construction ─────────────────────────────────────────────────

    pub fn from_document(name: &str, xml: &str) -> Self {
        Self::parse(name, xml, ProfileSource::Desired)
    }

    pub fn from_bridge(name: &str, xml: &str) -> Self {
        Self::parse(name, xml, ProfileSource::Bridge)
    }

    /// Bridge document overlaid with the phonebook-only values. A missing
    /// section resets those values to their defaults and is recorded in
    /// `load_error`.
    pub fn from_bridge_and_phonebook(
        name: &str,
        xml: &str,
        section: Option<&PhonebookSection>,
    ) -> Self {
        let mut profile = Self::parse(name, xml, ProfileSource::Merged);
        let mut errors = Vec::new();
        let overlay = match section {
            Some(section) => PhonebookOverlay::decode(section, &mut errors),
            None => {
                errors.push("no phonebook entry".to_owned());
                PhonebookOverlay::default()
            }
        };
        overlay.apply(&mut profile);
        profile.push_errors(errors);
        profile
    }

    fn parse(name: &str, xml: &str, source: ProfileSource) -> Self {
        let mut profile = Self::new(name);
        profile.source = source;
        let mut errors = Vec::new();
        match document::parse(xml) {
            Ok(root) => {
                if !root.name.eq_ignore_ascii_case(ROOT) {
                    errors.push(format!("unexpected root element <{}>", root.name));
                }
                profile.read_root(&root, &mut errors);
            }
            Err(e) => errors.push(format!("document: {e}")),
        }
        profile.push_errors(errors);
        profile
    }

    fn push_errors(&mut self, errors: Vec<String>) {
        for e in errors {
            if !self.load_error.is_empty() {
                self.load_error.push_str("; ");
            }
            self.load_error.push_str(&e);
        }
    }

    fn read_root(&mut self, root: &Element, errors: &mut Vec<String>) {
        if let Some(v) = read_bool(root, "AlwaysOn", errors) {
            self.always_on = v;
            self.always_on_capable = v;
        }
        if let Some(v) = read_bool(root, "RememberCredentials", errors) {
            self.remember_credentials = v;
        }
        if let Some(raw) = root.child_text("DnsSuffix") {
            self.dns_suffixes = split_names(raw);
        }
        if let Some(raw) = root.child_text("TrustedNetworkDetection") {
            self.trusted_networks = split_names(raw);
        }
        if let Some(v) = read_bool(root, "DisableAdvancedOptionsEditButton", errors) {
            self.disable_advanced_options_edit_button = v;
        }
        if let Some(v) = read_bool(root, "DisableDisconnectButton", errors) {
            self.disable_disconnect_button = v;
        }
        if let Some(v) = read_bool(root, "DeviceTunnel", errors) {
            self.device_tunnel = v;
        }
        if let Some(v) = read_bool(root, "RegisterDNS", errors) {
            self.register_dns = v;
        }

        if let Some(proxy) = root.child("Proxy") {
            self.proxy_pac_url = proxy.child_text("AutoConfigUrl").map(str::to_owned);
            self.proxy_server = proxy
                .child("Manual")
                .and_then(|m| m.child_text("Server"))
                .map(str::to_owned);
        }

        if let Some(dc) = root.child("DeviceCompliance") {
            self.device_compliance_enabled = read_bool(dc, "Enabled", errors).unwrap_or(false);
            if let Some(sso) = dc.child("Sso") {
                self.device_compliance_sso_enabled =
                    read_bool(sso, "Enabled", errors).unwrap_or(false);
                self.device_compliance_sso_eku = sso.child_text("Eku").map(str::to_owned);
                self.device_compliance_sso_issuer_hash = sso
                    .children_named("IssuerHash")
                    .map(|h| h.text.trim().to_ascii_uppercase())
                    .filter(|h| !h.is_empty())
                    .collect();
            }
        }

        for el in root.children_named("DomainNameInformation") {
            match DomainNameInformation::from_element(el) {
                Some(dni) => self.domain_name_information.push(dni),
                None => errors.push("DomainNameInformation without DomainName".to_owned()),
            }
        }
        for el in root.children_named("TrafficFilter") {
            self.traffic_filters.push(TrafficFilter::from_element(el));
        }

        if let Some(native) = root.child("NativeProfile") {
            self.read_native(native, errors);
        }

        for el in root.children_named("Route") {
            match Route::from_element(el) {
                Ok(route) => self.routes.push(route),
                Err(e) => errors.push(format!("Route: {e}")),
            }
        }
    }

    fn read_native(&mut self, native: &Element, errors: &mut Vec<String>) {
        if let Some(raw) = native.child_text("Servers") {
            self.servers = split_names(raw);
        }
        if let Some(p) = read_enum(native, "RoutingPolicyType", errors) {
            self.routing_policy = p;
        }
        if let Some(p) = read_enum(native, "NativeProtocolType", errors) {
            self.native_protocol = p;
        }
        if let Some(suite) = native.child("CryptographySuite") {
            self.cryptography_suite = Some(CryptographySuite::from_element(suite, errors));
        }
        if let Some(auth) = native.child("Authentication") {
            if let Some(method) = auth.child_text("UserMethod") {
                if method.eq_ignore_ascii_case("Eap") {
                    self.auth_method = Some(AuthMethod::Eap);
                } else {
                    errors.push(format!("UserMethod: unsupported '{method}'"));
                }
            } else if let Some(method) = auth.child_text("MachineMethod") {
                if method.eq_ignore_ascii_case("Certificate") {
                    self.auth_method = Some(AuthMethod::MachineCertificate);
                } else {
                    errors.push(format!("MachineMethod: unsupported '{method}'"));
                }
            }
            let config = auth
                .child("Eap")
                .and_then(|eap| eap.child("Configuration"))
                .and_then(|c| c.children.first());
            if let Some(config) = config {
                match document::render(config) {
                    Ok(xml) => self.eap_configuration = Some(xml),
                    Err(e) => errors.push(format!("Eap: {e}")),
                }
            }
        }
        if let Some(v) = read_bool(native, "DisableClassBasedDefaultRoute", errors) {
            self.disable_class_based_default_route = v;
        }
    }

    // ── Rendering ────────────────────────────────────────────────────

    /// Build the document tree in canonical element order.
    ///
    /// The consuming subsystem validates structure, so the order here is
    /// part of the format.
    pub fn to_document(&self) -> Result<Element, DocumentError> {
        let mut root = Element::new(ROOT)
            .with(Element::flag("AlwaysOn", self.always_on))
            .with(Element::flag("RememberCredentials", self.remember_credentials));
        if !self.dns_suffixes.is_empty() {
            root.push(Element::text("DnsSuffix", self.dns_suffixes.join(",")));
        }
        if !self.trusted_networks.is_empty() {
            root.push(Element::text(
                "TrustedNetworkDetection",
                self.trusted_networks.join(","),
            ));
        }
        if self.disable_advanced_options_edit_button {
            root.push(Element::flag("DisableAdvancedOptionsEditButton", true));
        }
        if self.disable_disconnect_button {
            root.push(Element::flag("DisableDisconnectButton", true));
        }
        if self.device_tunnel {
            root.push(Element::flag("DeviceTunnel", true));
        }
        if self.register_dns {
            root.push(Element::flag("RegisterDNS", true));
        }
        if let Some(proxy) = self.proxy_element() {
            root.push(proxy);
        }
        if self.device_compliance_enabled {
            root.push(self.device_compliance_element());
        }
        for dni in &self.domain_name_information {
            root.push(dni.to_element());
        }
        for filter in &self.traffic_filters {
            root.push(filter.to_element());
        }
        root.push(self.native_element()?);
        for route in &self.routes {
            root.push(route.to_element());
        }
        Ok(root)
    }

    fn proxy_element(&self) -> Option<Element> {
        if let Some(url) = &self.proxy_pac_url {
            return Some(Element::new("Proxy").with(Element::text("AutoConfigUrl", url.as_str())));
        }
        self.proxy_server.as_ref().map(|server| {
            Element::new("Proxy")
                .with(Element::new("Manual").with(Element::text("Server", server.as_str())))
        })
    }

    fn device_compliance_element(&self) -> Element {
        let mut sso = Element::new("Sso").with(Element::flag(
            "Enabled",
            self.device_compliance_sso_enabled,
        ));
        if let Some(eku) = &self.device_compliance_sso_eku {
            sso.push(Element::text("Eku", eku.as_str()));
        }
        for hash in &self.device_compliance_sso_issuer_hash {
            sso.push(Element::text("IssuerHash", hash.as_str()));
        }
        Element::new("DeviceCompliance")
            .with(Element::flag("Enabled", true))
            .with(sso)
    }

    fn native_element(&self) -> Result<Element, DocumentError> {
        let mut native = Element::new("NativeProfile")
            .with(Element::text("Servers", self.servers.join(",")))
            .with(Element::text(
                "RoutingPolicyType",
                self.routing_policy.to_string(),
            ))
            .with(Element::text(
                "NativeProtocolType",
                self.native_protocol.to_string(),
            ));
        if let Some(suite) = &self.cryptography_suite {
            native.push(suite.to_element());
        }
        if let Some(method) = self.auth_method {
            let mut auth = Element::new("Authentication");
            match method {
                AuthMethod::Eap => {
                    auth.push(Element::text("UserMethod", "Eap"));
                    if let Some(config) = &self.eap_configuration {
                        let body = document::parse(config)?;
                        auth.push(
                            Element::new("Eap").with(Element::new("Configuration").with(body)),
                        );
                    }
                }
                AuthMethod::MachineCertificate => {
                    auth.push(Element::text("MachineMethod", "Certificate"));
                }
            }
            native.push(auth);
        }
        if self.disable_class_based_default_route {
            native.push(Element::flag("DisableClassBasedDefaultRoute", true));
        }
        Ok(native)
    }

    pub fn render(&self) -> Result<String, DocumentError> {
        document::render(&self.to_document()?)
    }

    // ── Comparison ───────────────────────────────────────────────────

    /// True only for an untouched baseline: nothing configured.
    pub fn is_default(&self) -> bool {
        self.load_error.is_empty() && *self == Self::new(self.name.as_str())
    }

    /// Domains registered for auto-trigger.
    pub fn auto_trigger_domains(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .domain_name_information
            .iter()
            .filter(|d| d.auto_trigger)
            .map(|d| d.domain_name.as_str())
            .collect();
        out.sort_unstable();
        out
    }

    /// Field name → mismatch description for every differing field. A
    /// load error on either side is itself an entry.
    pub fn diff(&self, other: &Self) -> IndexMap<&'static str, String> {
        let mut d = Diff::default();
        d.scalar("Name", &self.name, &other.name);
        d.scalar("AlwaysOn", &self.always_on, &other.always_on);
        d.scalar(
            "AlwaysOnCapable",
            &self.always_on_capable,
            &other.always_on_capable,
        );
        d.scalar(
            "RememberCredentials",
            &self.remember_credentials,
            &other.remember_credentials,
        );
        d.set("DnsSuffix", &self.dns_suffixes, &other.dns_suffixes);
        d.set(
            "TrustedNetworkDetection",
            &self.trusted_networks,
            &other.trusted_networks,
        );
        d.scalar(
            "DisableAdvancedOptionsEditButton",
            &self.disable_advanced_options_edit_button,
            &other.disable_advanced_options_edit_button,
        );
        d.scalar(
            "DisableDisconnectButton",
            &self.disable_disconnect_button,
            &other.disable_disconnect_button,
        );
        d.scalar("DeviceTunnel", &self.device_tunnel, &other.device_tunnel);
        d.scalar("RegisterDNS", &self.register_dns, &other.register_dns);
        d.scalar("ProxyAutoConfigUrl", &self.proxy_pac_url, &other.proxy_pac_url);
        d.scalar("ProxyServer", &self.proxy_server, &other.proxy_server);
        d.scalar(
            "DeviceCompliance",
            &self.device_compliance_enabled,
            &other.device_compliance_enabled,
        );
        d.scalar(
            "DeviceComplianceSso",
            &self.device_compliance_sso_enabled,
            &other.device_compliance_sso_enabled,
        );
        d.scalar(
            "DeviceComplianceSsoEku",
            &self.device_compliance_sso_eku,
            &other.device_compliance_sso_eku,
        );
        d.set(
            "DeviceComplianceSsoIssuerHash",
            &self.device_compliance_sso_issuer_hash,
            &other.device_compliance_sso_issuer_hash,
        );
        d.set(
            "DomainNameInformation",
            &self.domain_name_information,
            &other.domain_name_information,
        );
        d.set("TrafficFilter", &self.traffic_filters, &other.traffic_filters);
        d.set("Servers", &self.servers, &other.servers);
        d.scalar("RoutingPolicyType", &self.routing_policy, &other.routing_policy);
        d.scalar(
            "NativeProtocolType",
            &self.native_protocol,
            &other.native_protocol,
        );
        d.scalar(
            "CryptographySuite",
            &self.cryptography_suite,
            &other.cryptography_suite,
        );
        d.scalar("Authentication", &self.auth_method, &other.auth_method);
        d.scalar(
            "EapConfiguration",
            &self.eap_configuration,
            &other.eap_configuration,
        );
        d.scalar(
            "DisableClassBasedDefaultRoute",
            &self.disable_class_based_default_route,
            &other.disable_class_based_default_route,
        );
        d.set("Route", &self.routes, &other.routes);
        if !self.load_error.is_empty() || !other.load_error.is_empty() {
            d.entries.insert(
                "LoadError",
                format!("'{}' vs '{}'", self.load_error, other.load_error),
            );
        }
        d.entries
    }
}

#[derive(Default)]
struct Diff {
    entries: IndexMap<&'static str, String>,
}

impl Diff {
    fn scalar<T: PartialEq + fmt::Debug>(&mut self, field: &'static str, a: &T, b: &T) {
        if a != b {
            self.entries.insert(field, format!("{a:?} vs {b:?}"));
        }
    }

    fn set<T: PartialEq + fmt::Display>(&mut self, field: &'static str, a: &[T], b: &[T]) {
        if same_set(a, b) {
            return;
        }
        let only = |xs: &[T], ys: &[T]| -> String {
            xs.iter()
                .filter(|x| !ys.contains(x))
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        self.entries.insert(
            field,
            format!("only left: [{}]; only right: [{}]", only(a, b), only(b, a)),
        );
    }
}

impl PartialEq for Profile {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.always_on == other.always_on
            && self.always_on_capable == other.always_on_capable
            && self.remember_credentials == other.remember_credentials
            && same_set(&self.dns_suffixes, &other.dns_suffixes)
            && same_set(&self.trusted_networks, &other.trusted_networks)
            && self.disable_advanced_options_edit_button
                == other.disable_advanced_options_edit_button
            && self.disable_disconnect_button == other.disable_disconnect_button
            && self.device_tunnel == other.device_tunnel
            && self.register_dns == other.register_dns
            && self.proxy_pac_url == other.proxy_pac_url
            && self.proxy_server == other.proxy_server
            && self.device_compliance_enabled == other.device_compliance_enabled
            && self.device_compliance_sso_enabled == other.device_compliance_sso_enabled
            && self.device_compliance_sso_eku == other.device_compliance_sso_eku
            && same_set(
                &self.device_compliance_sso_issuer_hash,
                &other.device_compliance_sso_issuer_hash,
            )
            && same_set(
                &self.domain_name_information,
                &other.domain_name_information,
            )
            && same_set(&self.traffic_filters, &other.traffic_filters)
            && same_set(&self.servers, &other.servers)
            && self.routing_policy == other.routing_policy
            && self.native_protocol == other.native_protocol
            && self.cryptography_suite == other.cryptography_suite
            && self.auth_method == other.auth_method
            && self.eap_configuration == other.eap_configuration
            && self.disable_class_based_default_route == other.disable_class_based_default_route
            && same_set(&self.routes, &other.routes)
    }
}

impl Eq for Profile {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::filter::FilterDirection;
    use pretty_assertions::assert_eq;

    fn sample() -> Profile {
        let mut p = Profile::new("Corp VPN");
        p.always_on = true;
        p.always_on_capable = true;
        p.dns_suffixes = vec!["corp.contoso.com".into()];
        p.trusted_networks = vec!["corp.contoso.com".into()];
        p.servers = vec!["vpn.contoso.com".into()];
        p.auth_method = Some(AuthMethod::Eap);
        p.routes = vec![
            Route::parse_cidr("10.0.0.0/8").unwrap(),
            Route::parse_cidr("172.16.0.0/12").unwrap(),
        ];
        p.traffic_filters = vec![
            TrafficFilter::from_rule_string("v2.30|Dir=Out|Protocol=6|RPort=443|").unwrap(),
            TrafficFilter::from_rule_string("v2.30|Dir=Out|Protocol=17|RPort=53|").unwrap(),
        ];
        p
    }

    #[test]
    fn baseline_is_default() {
        assert!(Profile::new("x").is_default());
        assert!(!sample().is_default());

        let mut broken = Profile::new("x");
        broken.load_error = "boom".into();
        assert!(!broken.is_default());
    }

    #[test]
    fn list_order_does_not_affect_equality() {
        let a = sample();
        let mut b = sample();
        b.routes.reverse();
        b.traffic_filters.reverse();
        assert_eq!(a, b);
        assert!(a.diff(&b).is_empty());
    }

    #[test]
    fn repeated_members_do_not_affect_equality() {
        let a = sample();
        let mut b = sample();
        b.routes.push(b.routes[0].clone());
        b.dns_suffixes.push("corp.contoso.com".into());
        assert_eq!(a, b);
        assert!(a.diff(&b).is_empty());

        b.routes.push(Route::parse_cidr("192.168.0.0/16").unwrap());
        assert_ne!(a, b);
        assert_eq!(
            a.diff(&b)["Route"],
            "only left: []; only right: [192.168.0.0/16]"
        );
    }

    #[test]
    fn equality_ignores_source_and_load_error() {
        let a = sample();
        let mut b = sample();
        b.source = ProfileSource::Merged;
        b.load_error = "no phonebook entry".into();
        assert_eq!(a, b);
        assert_eq!(a.diff(&b).keys().copied().collect::<Vec<_>>(), vec!["LoadError"]);
    }

    #[test]
    fn diff_keys_are_symmetric() {
        let a = sample();
        let mut b = Profile::new("Corp VPN");
        b.register_dns = true;
        b.traffic_filters = vec![TrafficFilter {
            direction: FilterDirection::Inbound,
            ..a.traffic_filters[0].clone()
        }];
        b.load_error = "Route: bad".into();

        let ab: Vec<_> = a.diff(&b).keys().copied().collect();
        let ba: Vec<_> = b.diff(&a).keys().copied().collect();
        assert_eq!(ab, ba);
        assert!(ab.contains(&"Route"));
        assert!(ab.contains(&"LoadError"));
    }

    #[test]
    fn document_roundtrip_preserves_value() {
        let profile = sample();
        let xml = profile.render().unwrap();
        let back = Profile::from_document("Corp VPN", &xml);
        assert_eq!(back.load_error, "");
        assert_eq!(back, profile);
    }

    #[test]
    fn malformed_parts_accumulate_errors() {
        let xml = "<VPNProfile><AlwaysOn>maybe</AlwaysOn>\
                   <Route><Address>banana</Address></Route>\
                   <Route><Address>10.0.0.0</Address><PrefixSize>8</PrefixSize></Route>\
                   </VPNProfile>";
        let p = Profile::from_bridge("Corp VPN", xml);
        assert_eq!(p.routes.len(), 1);
        assert!(p.load_error.contains("AlwaysOn"));
        assert!(p.load_error.contains("banana"));
    }

    #[test]
    fn unparseable_document_still_yields_profile() {
        let p = Profile::from_document("Corp VPN", "<VPNProfile>");
        assert_eq!(p.name, "Corp VPN");
        assert!(!p.load_error.is_empty());
    }

    #[test]
    fn canonical_element_order() {
        let mut p = sample();
        p.register_dns = true;
        p.device_tunnel = true;
        p.proxy_server = Some("proxy:8080".into());
        p.domain_name_information = vec![DomainNameInformation::new(".corp", ["10.0.0.1"], false)];
        let names: Vec<String> = p
            .to_document()
            .unwrap()
            .children
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "AlwaysOn",
                "RememberCredentials",
                "DnsSuffix",
                "TrustedNetworkDetection",
                "DeviceTunnel",
                "RegisterDNS",
                "Proxy",
                "DomainNameInformation",
                "TrafficFilter",
                "TrafficFilter",
                "NativeProfile",
                "Route",
                "Route",
            ]
        );
    }
}
