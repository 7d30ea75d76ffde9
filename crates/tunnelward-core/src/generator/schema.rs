// ── Structural profile schema ──
//
// The consuming subsystem validates documents structurally. These checks
// mirror that: a base schema for the root, then a sub-schema keyed by the
// native protocol. Unknown elements are warnings; anything the consumer
// would reject is a failure.

use crate::document::Element;
use crate::model::NativeProtocol;
use crate::model::profile::ROOT;

use super::{GenerationIssue, Severity};

/// Top-level elements in canonical order.
pub const TOP_LEVEL_ORDER: &[&str] = &[
    "AlwaysOn",
    "RememberCredentials",
    "DnsSuffix",
    "TrustedNetworkDetection",
    "DisableAdvancedOptionsEditButton",
    "DisableDisconnectButton",
    "DeviceTunnel",
    "RegisterDNS",
    "Proxy",
    "DeviceCompliance",
    "DomainNameInformation",
    "TrafficFilter",
    "NativeProfile",
    "Route",
];

/// `NativeProfile` children in canonical order.
pub const NATIVE_ORDER: &[&str] = &[
    "Servers",
    "RoutingPolicyType",
    "NativeProtocolType",
    "CryptographySuite",
    "Authentication",
    "DisableClassBasedDefaultRoute",
];

const REPEATABLE: &[&str] = &["DomainNameInformation", "TrafficFilter", "Route"];

const BOOLEANS: &[&str] = &[
    "AlwaysOn",
    "RememberCredentials",
    "DisableAdvancedOptionsEditButton",
    "DisableDisconnectButton",
    "DeviceTunnel",
    "RegisterDNS",
];

fn position(order: &[&str], name: &str) -> Option<usize> {
    order.iter().position(|n| n.eq_ignore_ascii_case(name))
}

#[derive(Default)]
struct Report {
    issues: Vec<GenerationIssue>,
}

impl Report {
    fn fail(&mut self, message: String) {
        self.issues.push(GenerationIssue::failure(message));
    }

    fn warn(&mut self, message: String) {
        self.issues.push(GenerationIssue::warning(message));
    }

    /// Children of `parent` must appear in `order`, never going backwards.
    fn ordered(&mut self, parent: &Element, order: &[&str], repeatable: &[&str]) {
        let mut last = 0;
        let mut seen = vec![0_usize; order.len()];
        for child in &parent.children {
            let Some(pos) = position(order, &child.name) else {
                self.warn(format!(
                    "{}: unknown element <{}> ignored",
                    parent.name, child.name
                ));
                continue;
            };
            if pos < last {
                self.fail(format!(
                    "{}: <{}> must come before <{}>",
                    parent.name, child.name, order[last]
                ));
            }
            last = last.max(pos);
            seen[pos] += 1;
            if seen[pos] == 2 && !repeatable.contains(&order[pos]) {
                self.fail(format!(
                    "{}: <{}> may appear only once",
                    parent.name, child.name
                ));
            }
        }
    }

    fn boolean(&mut self, parent: &Element, name: &str) {
        if let Some(el) = parent.child(name) {
            let text = el.text.trim();
            if text != "true" && text != "false" {
                self.fail(format!("<{name}> must be true or false, got '{text}'"));
            }
        }
    }
}

/// Validate a parsed document. Issues carry their own severity.
pub fn validate(root: &Element) -> Vec<GenerationIssue> {
    let mut report = Report::default();
    if !root.name.eq_ignore_ascii_case(ROOT) {
        report.fail(format!("root element must be <{ROOT}>, got <{}>", root.name));
        return report.issues;
    }

    report.ordered(root, TOP_LEVEL_ORDER, REPEATABLE);
    for name in BOOLEANS {
        report.boolean(root, name);
    }

    for route in root.children_named("Route") {
        if route.child_text("Address").is_none() || route.child_text("PrefixSize").is_none() {
            report.fail("<Route> requires <Address> and <PrefixSize>".to_owned());
        }
    }
    for dni in root.children_named("DomainNameInformation") {
        if dni.child_text("DomainName").is_none() {
            report.fail("<DomainNameInformation> requires <DomainName>".to_owned());
        }
    }
    if let Some(proxy) = root.child("Proxy") {
        if proxy.child("AutoConfigUrl").is_none() && proxy.child("Manual").is_none() {
            report.fail("<Proxy> requires <AutoConfigUrl> or <Manual>".to_owned());
        }
    }

    // Repeats are reported by `ordered`.
    match root.child("NativeProfile") {
        Some(native) => native_profile(&mut report, native),
        None => report.fail("<NativeProfile> is required".to_owned()),
    }
    report.issues
}

fn native_profile(report: &mut Report, native: &Element) {
    report.ordered(native, NATIVE_ORDER, &[]);
    if native.child_text("Servers").is_none() {
        report.fail("<NativeProfile> requires non-empty <Servers>".to_owned());
    }
    if let Some(policy) = native.child_text("RoutingPolicyType") {
        if policy.parse::<crate::model::RoutingPolicy>().is_err() {
            report.fail(format!("unknown RoutingPolicyType '{policy}'"));
        }
    }
    report.boolean(native, "DisableClassBasedDefaultRoute");

    let protocol = match native.child_text("NativeProtocolType") {
        Some(text) => match text.parse::<NativeProtocol>() {
            Ok(p) => p,
            Err(_) => {
                report.fail(format!("unknown NativeProtocolType '{text}'"));
                return;
            }
        },
        None => NativeProtocol::default(),
    };

    if let Some(auth) = native.child("Authentication") {
        authentication(report, auth);
    }

    // ── Protocol sub-schemas ──
    match protocol {
        NativeProtocol::Ikev2 => {
            if native.child("Authentication").is_none() {
                report.fail("IKEv2 profiles require <Authentication>".to_owned());
            }
        }
        NativeProtocol::Sstp => {
            if native.child("CryptographySuite").is_some() {
                report.fail("SSTP profiles cannot carry <CryptographySuite>".to_owned());
            }
        }
        NativeProtocol::Pptp
        | NativeProtocol::L2tp
        | NativeProtocol::Automatic
        | NativeProtocol::ProtocolList => {}
    }
}

fn authentication(report: &mut Report, auth: &Element) {
    let user = auth.child_text("UserMethod");
    let machine = auth.child_text("MachineMethod");
    match (user, machine) {
        (None, None) => {
            report.fail("<Authentication> requires <UserMethod> or <MachineMethod>".to_owned());
        }
        (Some(_), Some(_)) => {
            report.fail("<Authentication> cannot carry both user and machine methods".to_owned());
        }
        (Some(method), None) => {
            let configured = auth
                .child("Eap")
                .and_then(|eap| eap.child("Configuration"))
                .is_some_and(|c| !c.children.is_empty());
            if method.eq_ignore_ascii_case("Eap") && !configured {
                report.fail("<UserMethod>Eap requires <Eap><Configuration>".to_owned());
            }
        }
        (None, Some(_)) => {}
    }
}

/// Split issues into `(warnings, failures)`.
pub fn bucket(issues: Vec<GenerationIssue>) -> (Vec<GenerationIssue>, Vec<GenerationIssue>) {
    issues
        .into_iter()
        .partition(|i| i.severity == Severity::Warning)
}
