use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::Element;

/// Per-domain name resolution policy (`<DomainNameInformation>`).
///
/// Domain names compare case-insensitively; server lists compare as sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainNameInformation {
    pub domain_name: String,
    pub dns_servers: Vec<String>,
    pub web_proxy_servers: Vec<String>,
    pub auto_trigger: bool,
}

fn canonical_list<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = values
        .into_iter()
        .flat_map(|v| v.split([',', ';']))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .collect();
    out.sort();
    out.dedup();
    out
}

impl DomainNameInformation {
    pub fn new<'a>(
        domain_name: &str,
        dns_servers: impl IntoIterator<Item = &'a str>,
        auto_trigger: bool,
    ) -> Self {
        Self {
            domain_name: domain_name.trim().to_ascii_lowercase(),
            dns_servers: canonical_list(dns_servers),
            web_proxy_servers: Vec::new(),
            auto_trigger,
        }
    }

    pub fn with_web_proxies<'a>(mut self, servers: impl IntoIterator<Item = &'a str>) -> Self {
        self.web_proxy_servers = canonical_list(servers);
        self
    }

    /// `None` when the element has no domain name.
    pub fn from_element(element: &Element) -> Option<Self> {
        let domain = element.child_text("DomainName")?;
        let dns = element.child_text("DnsServers").unwrap_or_default();
        let auto_trigger = element
            .child_text("AutoTrigger")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let proxies = element.child_text("WebProxyServers").unwrap_or_default();
        Some(Self::new(domain, [dns], auto_trigger).with_web_proxies([proxies]))
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("DomainNameInformation")
            .with(Element::text("DomainName", self.domain_name.as_str()));
        if !self.dns_servers.is_empty() {
            el.push(Element::text("DnsServers", self.dns_servers.join(",")));
        }
        if !self.web_proxy_servers.is_empty() {
            el.push(Element::text(
                "WebProxyServers",
                self.web_proxy_servers.join(","),
            ));
        }
        if self.auto_trigger {
            el.push(Element::flag("AutoTrigger", true));
        }
        el
    }
}

impl fmt::Display for DomainNameInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> [{}]", self.domain_name, self.dns_servers.join(","))?;
        if self.auto_trigger {
            f.write_str(" auto-trigger")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn element_roundtrip_normalizes() {
        let dni = DomainNameInformation::new(".Corp.Contoso.COM", ["10.0.0.2,10.0.0.1"], true);
        assert_eq!(dni.domain_name, ".corp.contoso.com");
        assert_eq!(dni.dns_servers, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(DomainNameInformation::from_element(&dni.to_element()), Some(dni));
    }

    #[test]
    fn missing_domain_is_skipped() {
        let el = Element::new("DomainNameInformation").with(Element::text("DnsServers", "1.1.1.1"));
        assert!(DomainNameInformation::from_element(&el).is_none());
    }
}
