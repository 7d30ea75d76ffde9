// ── Profile generator ──
//
// Turns desired settings into a canonical, schema-valid profile document.
// Cross-field validation produces failures (no document) or warnings (the
// offending setting is dropped or clamped). Capability gating drops what
// the host build cannot accept.

pub mod eap;
pub mod routes;
pub mod schema;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tunnelward_api::RouteSources;

use crate::capability::{HostCapability, INBOUND_FILTER_BUILD, UI_LOCK_BUILD};
use crate::document;
use crate::error::CoreError;
use crate::model::{
    AuthMethod, CryptographySuite, DomainNameInformation, FilterDirection, ManagedProfile,
    PROTOCOL_TCP, PROTOCOL_UDP, Profile, ProfileClass, Route, RoutingPolicy, RuntimeAttributes,
    TrafficFilter, VpnStrategy,
};
use crate::settings::{FilterSetting, ProfileSettings};

pub use routes::RouteCache;

pub const MTU_MIN: u32 = 576;
pub const MTU_MAX: u32 = 1400;
pub const METRIC_MAX: u32 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Warning,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationIssue {
    pub severity: Severity,
    pub message: String,
}

impl GenerationIssue {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Failure,
            message: message.into(),
        }
    }

    fn downgraded(self) -> Self {
        Self::warning(self.message)
    }
}

impl fmt::Display for GenerationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Result of one generation pass. `document` is `None` exactly when there
/// are failures.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub name: String,
    pub class: ProfileClass,
    pub document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    pub attributes: RuntimeAttributes,
    pub warnings: Vec<GenerationIssue>,
    pub failures: Vec<GenerationIssue>,
}

impl GenerationOutcome {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty() && self.document.is_some()
    }

    /// The runtime descriptor the scheduler queues.
    pub fn into_managed(self) -> Result<ManagedProfile, CoreError> {
        match self.document {
            Some(document) if self.failures.is_empty() => {
                let mut managed =
                    ManagedProfile::new(self.name, self.class, document, self.attributes);
                if self.profile.is_some() {
                    managed.profile = self.profile;
                }
                Ok(managed)
            }
            _ => Err(CoreError::ValidationFailed {
                profile: self.name,
                message: self
                    .failures
                    .iter()
                    .map(|f| f.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
            }),
        }
    }
}

#[derive(Default)]
struct Issues {
    warnings: Vec<GenerationIssue>,
    failures: Vec<GenerationIssue>,
}

impl Issues {
    fn warn(&mut self, message: impl Into<String>) {
        let issue = GenerationIssue::warning(message);
        debug!(issue = %issue.message, "generation warning");
        self.warnings.push(issue);
    }

    fn fail(&mut self, message: impl Into<String>) {
        self.failures.push(GenerationIssue::failure(message));
    }

    fn extend(&mut self, issues: Vec<GenerationIssue>) {
        let (warnings, failures) = schema::bucket(issues);
        self.warnings.extend(warnings);
        self.failures.extend(failures);
    }
}

pub struct Generator {
    capability: HostCapability,
    route_cache: RouteCache,
}

impl Generator {
    pub fn new(capability: HostCapability, sources: Arc<dyn RouteSources>) -> Self {
        Self {
            capability,
            route_cache: RouteCache::new(sources),
        }
    }

    pub fn capability(&self) -> HostCapability {
        self.capability
    }

    /// Generate the document for `settings`, or take the override document
    /// when one is configured.
    pub fn generate(&self, settings: &ProfileSettings) -> GenerationOutcome {
        if let Some(document) = &settings.override_document {
            return self.generate_override(settings, document);
        }

        let mut issues = Issues::default();
        let name = settings.name.trim().to_owned();
        if name.is_empty() {
            issues.fail("profile name is required");
        }
        let attributes = runtime_attributes(settings, &mut issues);
        let profile = self.build_profile(&name, settings, &mut issues);

        let mut outcome = GenerationOutcome {
            name,
            class: settings.class,
            document: None,
            profile: None,
            attributes,
            warnings: Vec::new(),
            failures: Vec::new(),
        };

        if issues.failures.is_empty() {
            match profile.to_document() {
                Ok(root) => {
                    issues.extend(schema::validate(&root));
                    match document::render(&root) {
                        Ok(xml) => {
                            let parsed = Profile::from_document(&outcome.name, &xml);
                            if !parsed.load_error.is_empty() {
                                issues.fail(format!(
                                    "generated document does not read back: {}",
                                    parsed.load_error
                                ));
                            }
                            outcome.document = Some(xml);
                            outcome.profile = Some(parsed);
                        }
                        Err(e) => issues.fail(format!("render: {e}")),
                    }
                }
                Err(e) => issues.fail(format!("render: {e}")),
            }
        }

        if issues.failures.is_empty() {
            info!(
                profile = %outcome.name,
                class = %outcome.class,
                warnings = issues.warnings.len(),
                "profile generated"
            );
        } else {
            outcome.document = None;
            outcome.profile = None;
            warn!(
                profile = %outcome.name,
                class = %outcome.class,
                failures = issues.failures.len(),
                "profile generation failed"
            );
        }
        outcome.warnings = issues.warnings;
        outcome.failures = issues.failures;
        outcome
    }

    /// Accept a pre-built document. It is parsed and schema-checked, but
    /// every failure is reported as a warning and the document is kept.
    pub fn generate_override(
        &self,
        settings: &ProfileSettings,
        document: &str,
    ) -> GenerationOutcome {
        let mut issues = Issues::default();
        let name = settings.name.trim().to_owned();
        if name.is_empty() {
            issues.fail("profile name is required");
        }
        let attributes = runtime_attributes(settings, &mut issues);

        match document::parse(document) {
            Ok(root) => issues.extend(schema::validate(&root)),
            Err(e) => issues.fail(format!("override document: {e}")),
        }
        let profile = Profile::from_document(&name, document);
        if !profile.load_error.is_empty() {
            issues.fail(format!("override document: {}", profile.load_error));
        }
        self.unsupported(&profile, &mut issues);

        let mut warnings = issues.warnings;
        warnings.extend(issues.failures.into_iter().map(GenerationIssue::downgraded));
        info!(
            profile = %name,
            class = %settings.class,
            warnings = warnings.len(),
            "using override document"
        );
        GenerationOutcome {
            name,
            class: settings.class,
            document: Some(document.to_owned()),
            profile: Some(profile),
            attributes,
            warnings,
            failures: Vec::new(),
        }
    }

    /// Settings in an override document the host build cannot honor.
    fn unsupported(&self, profile: &Profile, issues: &mut Issues) {
        if !self.capability.supports_inbound_filters()
            && profile
                .traffic_filters
                .iter()
                .any(|f| f.direction == FilterDirection::Inbound)
        {
            issues.warn(format!(
                "inbound traffic filters need build {INBOUND_FILTER_BUILD} or later (host is {})",
                self.capability.build
            ));
        }
        if !self.capability.supports_ui_lock()
            && (profile.disable_advanced_options_edit_button || profile.disable_disconnect_button)
        {
            issues.warn(format!(
                "UI lock buttons need build {UI_LOCK_BUILD} or later (host is {})",
                self.capability.build
            ));
        }
    }

    // ── Profile assembly ─────────────────────────────────────────────

    fn build_profile(
        &self,
        name: &str,
        settings: &ProfileSettings,
        issues: &mut Issues,
    ) -> Profile {
        let device = settings.class.is_device_tunnel();
        let mut profile = Profile::new(name);

        profile.servers = settings
            .external_address
            .split([',', ';'])
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        profile.servers.sort();
        profile.servers.dedup();
        if profile.servers.is_empty() {
            issues.fail("external server address is required");
        }

        profile.always_on = settings.always_on;
        profile.always_on_capable = settings.always_on;
        profile.remember_credentials = settings.remember_credentials;
        profile.register_dns = settings.register_dns;
        profile.device_tunnel = device;
        profile.dns_suffixes = lower_sorted(&settings.dns_suffixes);
        profile.trusted_networks = lower_sorted(&settings.trusted_networks);
        profile.routing_policy = settings.routing_policy;
        profile.native_protocol = settings.strategy.native_protocol();
        profile.disable_class_based_default_route = settings.disable_class_based_default_route;

        if device {
            if settings.routing_policy == RoutingPolicy::ForceTunnel {
                issues.fail("device tunnels cannot use force tunneling");
            }
            if settings.strategy != VpnStrategy::Ikev2Only {
                issues.fail(format!(
                    "device tunnels require the Ikev2Only strategy, got {}",
                    settings.strategy
                ));
            }
        }

        self.ui_lock(settings, &mut profile, issues);
        proxy(settings, &mut profile);
        device_compliance(settings, &mut profile);
        profile.domain_name_information = domain_name_information(settings, issues);
        profile.traffic_filters = self.traffic_filters(settings, issues);
        profile.cryptography_suite = cryptography(settings, issues);
        profile.routes = self.routes(settings, issues);

        if device {
            profile.auth_method = Some(AuthMethod::MachineCertificate);
        } else {
            profile.auth_method = Some(AuthMethod::Eap);
            profile.eap_configuration = user_authentication(settings, issues);
        }
        profile
    }

    fn ui_lock(&self, settings: &ProfileSettings, profile: &mut Profile, issues: &mut Issues) {
        let wanted =
            settings.disable_advanced_options_edit_button || settings.disable_disconnect_button;
        if !wanted {
            return;
        }
        if self.capability.supports_ui_lock() {
            profile.disable_advanced_options_edit_button =
                settings.disable_advanced_options_edit_button;
            profile.disable_disconnect_button = settings.disable_disconnect_button;
        } else {
            issues.warn(format!(
                "UI lock buttons need build {UI_LOCK_BUILD} or later (host is {}); dropped",
                self.capability.build
            ));
        }
    }

    fn traffic_filters(
        &self,
        settings: &ProfileSettings,
        issues: &mut Issues,
    ) -> Vec<TrafficFilter> {
        let mut out: Vec<TrafficFilter> = Vec::new();
        for (label, setting) in &settings.traffic_filters {
            let filter = match setting {
                FilterSetting::Rule(rule) => match TrafficFilter::from_rule_string(rule) {
                    Ok(f) => f,
                    Err(e) => {
                        issues.warn(format!("traffic filter '{label}': decode failure: {e}"));
                        continue;
                    }
                },
                FilterSetting::Fields(fields) => TrafficFilter::from_element(&fields.to_element()),
            };

            let problem = if !filter.valid {
                Some(filter.issue.clone().unwrap_or_else(|| "invalid".to_owned()))
            } else if filter.direction == FilterDirection::Inbound
                && !self.capability.supports_inbound_filters()
            {
                Some(format!(
                    "inbound direction needs build {INBOUND_FILTER_BUILD} or later"
                ))
            } else if filter.has_ports()
                && !matches!(filter.protocol, Some(PROTOCOL_TCP | PROTOCOL_UDP))
            {
                Some("port ranges require protocol TCP (6) or UDP (17)".to_owned())
            } else if !filter.has_effect() {
                Some("no effective configuration".to_owned())
            } else {
                None
            };

            match problem {
                Some(reason) => issues.warn(format!("traffic filter '{label}' dropped: {reason}")),
                None if out.contains(&filter) => {
                    debug!(filter = %label, "duplicate traffic filter skipped");
                }
                None => out.push(filter),
            }
        }
        out
    }

    fn routes(&self, settings: &ProfileSettings, issues: &mut Issues) -> Vec<Route> {
        let mut routes: Vec<Route> = Vec::new();

        for (cidr, comment) in &settings.include_routes {
            match Route::parse_cidr(cidr) {
                Ok(r) => push_unique(&mut routes, with_comment(r, comment)),
                Err(e) => issues.warn(format!("include route '{cidr}' dropped: {e}")),
            }
        }
        for (cidr, comment) in &settings.exclude_routes {
            match Route::parse_cidr(cidr) {
                Ok(r) => push_unique(&mut routes, with_comment(r.excluded(), comment)),
                Err(e) => issues.warn(format!("exclude route '{cidr}' dropped: {e}")),
            }
        }

        let mut fetch_warnings = Vec::new();
        for host in &settings.include_route_hostnames {
            for r in self.route_cache.resolve(host, &mut fetch_warnings) {
                push_unique(&mut routes, r);
            }
        }
        if settings.exclude_office365 {
            for r in self.route_cache.office365(&mut fetch_warnings) {
                push_unique(&mut routes, r);
            }
        }
        for w in fetch_warnings {
            issues.warn(w);
        }

        if let Some(metric) = settings.route_metric {
            let metric = metric.clamp(1, METRIC_MAX);
            for r in &mut routes {
                r.metric = metric;
            }
        }

        if settings.routing_policy == RoutingPolicy::SplitTunnel
            && !routes.iter().any(|r| !r.exclusion)
        {
            issues.fail("split tunneling requires at least one include route");
        }
        routes
    }
}

// ── Runtime attributes ───────────────────────────────────────────────

fn runtime_attributes(settings: &ProfileSettings, issues: &mut Issues) -> RuntimeAttributes {
    let mtu = settings.mtu.map(|mtu| {
        let clamped = mtu.clamp(MTU_MIN, MTU_MAX);
        if clamped != mtu {
            issues.warn(format!("MTU {mtu} clamped to {clamped}"));
        }
        clamped
    });
    let interface_metric = settings.interface_metric.map(|metric| {
        if metric > METRIC_MAX {
            issues.warn(format!("interface metric {metric} clamped to {METRIC_MAX}"));
        }
        metric.min(METRIC_MAX)
    });

    let machine_eku_filter = match (&settings.machine_eku_filter, settings.class) {
        (Some(filter), ProfileClass::Machine) => Some(filter.clone()),
        (Some(_), _) => {
            issues.warn("machine certificate EKU filter applies to device tunnels only");
            None
        }
        (None, _) => None,
    };

    let has_proxy_server = settings.proxy_server.is_some();
    if !has_proxy_server && (!settings.proxy_exceptions.is_empty() || settings.proxy_bypass_local)
    {
        issues.warn("proxy exceptions and bypass-for-local need a proxy server; ignored");
    }

    RuntimeAttributes {
        interface_metric,
        strategy: Some(settings.strategy),
        disable_credentials: settings.disable_credentials,
        network_outage_time: settings.network_outage_time,
        mtu,
        machine_eku_filter,
        proxy_exceptions: if has_proxy_server {
            settings.proxy_exceptions.clone()
        } else {
            Vec::new()
        },
        proxy_bypass_local: has_proxy_server && settings.proxy_bypass_local,
    }
}

fn push_unique(routes: &mut Vec<Route>, route: Route) {
    if !routes.contains(&route) {
        routes.push(route);
    }
}

fn with_comment(route: Route, comment: &str) -> Route {
    if comment.trim().is_empty() {
        route
    } else {
        route.with_comment(comment.trim())
    }
}

fn lower_sorted(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn proxy(settings: &ProfileSettings, profile: &mut Profile) {
    // A PAC URL takes precedence over a manual server.
    let pac = settings
        .proxy_pac_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());
    if let Some(url) = pac {
        profile.proxy_pac_url = Some(url.to_owned());
        return;
    }
    profile.proxy_server = settings
        .proxy_server
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);
}

fn device_compliance(settings: &ProfileSettings, profile: &mut Profile) {
    if !settings.device_compliance {
        return;
    }
    profile.device_compliance_enabled = true;
    profile.device_compliance_sso_eku = settings.device_compliance_sso_eku.clone();
    profile.device_compliance_sso_enabled = profile.device_compliance_sso_eku.is_some();
    profile.device_compliance_sso_issuer_hash = settings
        .device_compliance_sso_issuer_hashes
        .iter()
        .map(|h| h.trim().to_ascii_uppercase())
        .filter(|h| !h.is_empty())
        .collect();
}

/// Explicit entries, or entries implied from the trusted networks (falling
/// back to the DNS suffixes) when DNS servers are set and none are listed.
fn domain_name_information(
    settings: &ProfileSettings,
    issues: &mut Issues,
) -> Vec<DomainNameInformation> {
    let mut out: Vec<DomainNameInformation> = Vec::new();
    for dni in &settings.domain_name_information {
        if dni.domain.trim().is_empty() {
            issues.warn("domain name information entry without a domain dropped");
            continue;
        }
        let entry = DomainNameInformation::new(
            &dni.domain,
            dni.dns_servers.iter().map(String::as_str),
            dni.auto_trigger,
        )
        .with_web_proxies(dni.web_proxy_servers.iter().map(String::as_str));
        if !out.contains(&entry) {
            out.push(entry);
        }
    }
    if !out.is_empty() || settings.dns_servers.is_empty() {
        return out;
    }

    let domains = if settings.trusted_networks.is_empty() {
        &settings.dns_suffixes
    } else {
        &settings.trusted_networks
    };
    for domain in lower_sorted(domains) {
        let domain = if domain.starts_with('.') {
            domain
        } else {
            format!(".{domain}")
        };
        out.push(DomainNameInformation::new(
            &domain,
            settings.dns_servers.iter().map(String::as_str),
            false,
        ));
    }
    out
}

fn cryptography(
    settings: &ProfileSettings,
    issues: &mut Issues,
) -> Option<CryptographySuite> {
    let mut custom = settings.custom_cryptography;
    if custom && settings.strategy.is_sstp_based() {
        issues.warn(format!(
            "custom cryptography is not supported with {}; disabled",
            settings.strategy
        ));
        custom = false;
    }
    // Never reached while the rule above disables custom cryptography for
    // every SSTP-based strategy. Kept as its own rule; see DESIGN.md.
    if custom && settings.strategy == VpnStrategy::SstpOnly {
        issues.warn("custom cryptography is ignored by SSTP");
    }
    if !custom {
        return None;
    }
    if settings.strategy == VpnStrategy::GreOnly {
        issues.warn("custom cryptography is not applied with GreOnly; cryptography suite omitted");
        return None;
    }
    Some(settings.cryptography)
}

fn user_authentication(settings: &ProfileSettings, issues: &mut Issues) -> Option<String> {
    let eap_settings = &settings.eap;
    let mut thumbprints = Vec::new();
    for raw in &eap_settings.trusted_root_thumbprints {
        match eap::normalize_thumbprint(raw) {
            Some(t) if !thumbprints.contains(&t) => thumbprints.push(t),
            Some(_) => {}
            None => issues.warn(format!("malformed certificate thumbprint '{raw}' ignored")),
        }
    }
    if thumbprints.is_empty() {
        issues.fail("user tunnels require at least one trusted root certificate thumbprint");
    }
    if !eap_settings.disable_nps_validation
        && !eap_settings.nps_servers.iter().any(|s| !s.trim().is_empty())
    {
        issues.fail("user tunnels require at least one NPS server name");
    }
    if eap_settings.eku_name.is_some() != eap_settings.eku_oid.is_some() {
        issues.warn("EKU filtering needs both a name and an OID; ignored");
    }

    let config = eap::eap_host_config(eap_settings, &thumbprints);
    match document::render(&config) {
        Ok(xml) => Some(xml),
        Err(e) => {
            issues.fail(format!("EAP configuration: {e}"));
            None
        }
    }
}
