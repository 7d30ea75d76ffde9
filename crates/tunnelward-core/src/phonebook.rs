// ── Phonebook-only profile values ──
//
// The bridge document does not reliably carry every profile value. These
// live in the connection's phonebook section instead and are overlaid onto
// the bridge profile on every read:
//
//   DeviceTunnel=1        IpDnsFlags=1          AlwaysOnCapable=1
//   NumRoutes=2           Route0=<72 hex>       Route1=<72 hex>
//   NumTrafficFilters=1   TrafficFilter0=v2.30|Action=Allow|Dir=Out|...
//   DeviceComplianceEnabled / ...SsoEnabled / ...SsoEku / ...SsoIssuerHash

use tracing::warn;
use tunnelward_api::{PhonebookScope, PhonebookSection};

use crate::model::{Profile, Route, TrafficFilter};

pub mod keys {
    pub const DEVICE_TUNNEL: &str = "DeviceTunnel";
    pub const IP_DNS_FLAGS: &str = "IpDnsFlags";
    pub const ALWAYS_ON_CAPABLE: &str = "AlwaysOnCapable";
    pub const NUM_ROUTES: &str = "NumRoutes";
    pub const ROUTE: &str = "Route";
    pub const NUM_TRAFFIC_FILTERS: &str = "NumTrafficFilters";
    pub const TRAFFIC_FILTER: &str = "TrafficFilter";
    pub const DEVICE_COMPLIANCE_ENABLED: &str = "DeviceComplianceEnabled";
    pub const DEVICE_COMPLIANCE_SSO_ENABLED: &str = "DeviceComplianceSsoEnabled";
    pub const DEVICE_COMPLIANCE_SSO_EKU: &str = "DeviceComplianceSsoEku";
    pub const DEVICE_COMPLIANCE_SSO_ISSUER_HASH: &str = "DeviceComplianceSsoIssuerHash";
    pub const MACHINE_EKU_FILTER: &str = "MachineCertificateEKUFilter";
}

/// `IpDnsFlags` bit for "register this connection's addresses in DNS".
const DNS_REGISTER: u32 = 0x1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhonebookOverlay {
    pub device_tunnel: bool,
    pub register_dns: bool,
    pub always_on_capable: bool,
    pub routes: Vec<Route>,
    pub traffic_filters: Vec<TrafficFilter>,
    pub device_compliance_enabled: bool,
    pub device_compliance_sso_enabled: bool,
    pub device_compliance_sso_eku: Option<String>,
    pub device_compliance_sso_issuer_hash: Vec<String>,
}

impl PhonebookOverlay {
    /// Decode a section. A bad route or filter record is skipped and
    /// reported; the rest still decode.
    pub fn decode(section: &PhonebookSection, errors: &mut Vec<String>) -> Self {
        let mut overlay = Self {
            device_tunnel: section.get_bool(keys::DEVICE_TUNNEL),
            register_dns: section
                .get_u32(keys::IP_DNS_FLAGS)
                .is_some_and(|f| f & DNS_REGISTER != 0),
            always_on_capable: section.get_bool(keys::ALWAYS_ON_CAPABLE),
            device_compliance_enabled: section.get_bool(keys::DEVICE_COMPLIANCE_ENABLED),
            device_compliance_sso_enabled: section.get_bool(keys::DEVICE_COMPLIANCE_SSO_ENABLED),
            device_compliance_sso_eku: section
                .get(keys::DEVICE_COMPLIANCE_SSO_EKU)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned),
            device_compliance_sso_issuer_hash: section
                .get(keys::DEVICE_COMPLIANCE_SSO_ISSUER_HASH)
                .map(|v| {
                    v.split(',')
                        .map(|h| h.trim().to_ascii_uppercase())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            ..Self::default()
        };

        for (i, record) in records(section, keys::NUM_ROUTES, keys::ROUTE, errors) {
            match Route::decode_record(record) {
                Ok(route) => overlay.routes.push(route),
                Err(e) => errors.push(format!("{}{i}: {e}", keys::ROUTE)),
            }
        }
        for (i, rule) in records(
            section,
            keys::NUM_TRAFFIC_FILTERS,
            keys::TRAFFIC_FILTER,
            errors,
        ) {
            match TrafficFilter::from_rule_string(rule) {
                Ok(filter) => overlay.traffic_filters.push(filter),
                Err(e) => errors.push(format!("{}{i}: {e}", keys::TRAFFIC_FILTER)),
            }
        }
        overlay
    }

    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            device_tunnel: profile.device_tunnel,
            register_dns: profile.register_dns,
            always_on_capable: profile.always_on_capable,
            routes: profile.routes.clone(),
            traffic_filters: profile.traffic_filters.clone(),
            device_compliance_enabled: profile.device_compliance_enabled,
            device_compliance_sso_enabled: profile.device_compliance_sso_enabled,
            device_compliance_sso_eku: profile.device_compliance_sso_eku.clone(),
            device_compliance_sso_issuer_hash: profile.device_compliance_sso_issuer_hash.clone(),
        }
    }

    pub fn apply(self, profile: &mut Profile) {
        profile.device_tunnel = self.device_tunnel;
        profile.register_dns = self.register_dns;
        profile.always_on_capable = self.always_on_capable;
        profile.routes = self.routes;
        profile.traffic_filters = self.traffic_filters;
        profile.device_compliance_enabled = self.device_compliance_enabled;
        profile.device_compliance_sso_enabled = self.device_compliance_sso_enabled;
        profile.device_compliance_sso_eku = self.device_compliance_sso_eku;
        profile.device_compliance_sso_issuer_hash = self.device_compliance_sso_issuer_hash;
    }

    pub fn encode(&self) -> PhonebookSection {
        let mut section = PhonebookSection::new();
        section.set_bool(keys::DEVICE_TUNNEL, self.device_tunnel);
        section.set(
            keys::IP_DNS_FLAGS,
            if self.register_dns { "1" } else { "0" },
        );
        section.set_bool(keys::ALWAYS_ON_CAPABLE, self.always_on_capable);
        section.set(keys::NUM_ROUTES, self.routes.len().to_string());
        for (i, route) in self.routes.iter().enumerate() {
            section.set(format!("{}{i}", keys::ROUTE), route.encode_record());
        }
        section.set(
            keys::NUM_TRAFFIC_FILTERS,
            self.traffic_filters.len().to_string(),
        );
        for (i, filter) in self.traffic_filters.iter().enumerate() {
            section.set(
                format!("{}{i}", keys::TRAFFIC_FILTER),
                filter.to_rule_string(),
            );
        }
        section.set_bool(
            keys::DEVICE_COMPLIANCE_ENABLED,
            self.device_compliance_enabled,
        );
        section.set_bool(
            keys::DEVICE_COMPLIANCE_SSO_ENABLED,
            self.device_compliance_sso_enabled,
        );
        if let Some(eku) = &self.device_compliance_sso_eku {
            section.set(keys::DEVICE_COMPLIANCE_SSO_EKU, eku.as_str());
        }
        if !self.device_compliance_sso_issuer_hash.is_empty() {
            section.set(
                keys::DEVICE_COMPLIANCE_SSO_ISSUER_HASH,
                self.device_compliance_sso_issuer_hash.join(","),
            );
        }
        section
    }
}

/// `(index, value)` for each numbered record. Missing records are
/// reported and skipped. The declared count is capped at the number of
/// `<prefix><n>` keys actually present.
fn records<'a>(
    section: &'a PhonebookSection,
    count_key: &str,
    prefix: &str,
    errors: &mut Vec<String>,
) -> Vec<(u32, &'a str)> {
    let declared = section.get_u32(count_key).unwrap_or(0);
    let present = section
        .iter()
        .filter(|(k, _)| is_record_key(k, prefix))
        .count();
    let present = u32::try_from(present).unwrap_or(u32::MAX);
    let count = declared.min(present);
    if count < declared {
        warn!(key = count_key, declared, present, "record count exceeds records present");
        errors.push(format!("{count_key}: declares {declared} record(s), {present} present"));
    }
    let mut out = Vec::new();
    for i in 0..count {
        match section.get(&format!("{prefix}{i}")) {
            Some(v) => out.push((i, v)),
            None => errors.push(format!("{prefix}{i}: missing")),
        }
    }
    out
}

fn is_record_key(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// What the OS writes to the phonebook when `document` is installed:
/// the section plus the scope it lands in.
pub fn materialize(document: &str) -> (PhonebookScope, PhonebookSection) {
    let profile = Profile::from_document("", document);
    let scope = if profile.device_tunnel {
        PhonebookScope::AllUsers
    } else {
        PhonebookScope::CurrentUser
    };
    (scope, PhonebookOverlay::from_profile(&profile).encode())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn overlay_roundtrips_through_section() {
        let mut profile = Profile::new("Corp");
        profile.device_tunnel = true;
        profile.register_dns = true;
        profile.routes = vec![
            Route::parse_cidr("10.0.0.0/8").unwrap(),
            Route::parse_cidr("fd00::/8").unwrap().excluded(),
        ];
        profile.traffic_filters =
            vec![TrafficFilter::from_rule_string("v2.30|Dir=Out|Protocol=6|RPort=443|").unwrap()];
        let overlay = PhonebookOverlay::from_profile(&profile);

        let mut errors = Vec::new();
        let decoded = PhonebookOverlay::decode(&overlay.encode(), &mut errors);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(decoded, overlay);
    }

    #[test]
    fn bad_records_are_skipped_individually() {
        let section: PhonebookSection = [
            ("NumRoutes", "3"),
            ("Route0", "deadbeef"),
            ("Route1", Route::parse_cidr("10.0.0.0/8").unwrap().encode_record().as_str()),
            ("NumTrafficFilters", "2"),
            ("TrafficFilter0", "v2.30|Action=Allow|Protocol=6|"),
            ("TrafficFilter1", "v2.30|Action=Allow|Dir=Out|Protocol=6|"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();

        let mut errors = Vec::new();
        let overlay = PhonebookOverlay::decode(&section, &mut errors);
        assert_eq!(overlay.routes.len(), 1);
        assert_eq!(overlay.traffic_filters.len(), 1);
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn oversized_record_count_is_capped() {
        let route = Route::parse_cidr("10.0.0.0/8").unwrap().encode_record();
        let section: PhonebookSection = [
            ("NumRoutes", "4294967295"),
            ("Route0", route.as_str()),
            ("NumTrafficFilters", "1000000"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();

        let mut errors = Vec::new();
        let overlay = PhonebookOverlay::decode(&section, &mut errors);
        assert_eq!(overlay.routes.len(), 1);
        assert!(overlay.traffic_filters.is_empty());
        assert_eq!(
            errors,
            vec![
                "NumRoutes: declares 4294967295 record(s), 1 present".to_owned(),
                "NumTrafficFilters: declares 1000000 record(s), 0 present".to_owned(),
            ]
        );
    }

    #[test]
    fn device_tunnels_land_in_all_users() {
        let (scope, section) =
            materialize("<VPNProfile><DeviceTunnel>true</DeviceTunnel></VPNProfile>");
        assert_eq!(scope, PhonebookScope::AllUsers);
        assert!(section.get_bool(keys::DEVICE_TUNNEL));

        let (scope, _) = materialize("<VPNProfile/>");
        assert_eq!(scope, PhonebookScope::CurrentUser);
    }
}
