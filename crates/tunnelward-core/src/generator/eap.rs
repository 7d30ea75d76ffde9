// ── User-tunnel EAP configuration ──
//
// PEAP with inner EAP-TLS. Both layers validate the server against the
// same NPS names and trusted roots.

use crate::document::Element;
use crate::settings::EapSettings;

const NS_HOST_CONFIG: &str = "http://www.microsoft.com/provisioning/EapHostConfig";
const NS_COMMON: &str = "http://www.microsoft.com/provisioning/EapCommon";
const NS_BASE: &str = "http://www.microsoft.com/provisioning/BaseEapConnectionPropertiesV1";
const NS_PEAP_V1: &str = "http://www.microsoft.com/provisioning/MsPeapConnectionPropertiesV1";
const NS_PEAP_V2: &str = "http://www.microsoft.com/provisioning/MsPeapConnectionPropertiesV2";
const NS_TLS_V1: &str = "http://www.microsoft.com/provisioning/EapTlsConnectionPropertiesV1";
const NS_TLS_V2: &str = "http://www.microsoft.com/provisioning/EapTlsConnectionPropertiesV2";
const NS_TLS_V3: &str = "http://www.microsoft.com/provisioning/EapTlsConnectionPropertiesV3";

const EAP_TYPE_PEAP: &str = "25";
const EAP_TYPE_TLS: &str = "13";

/// Normalize a SHA-1 thumbprint to `aa bb cc ...`. `None` if it is not 20
/// bytes of hex.
pub fn normalize_thumbprint(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let bytes = hex::decode(&compact).ok().filter(|b| b.len() == 20)?;
    Some(
        bytes
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn ns(name: &str, namespace: &str) -> Element {
    Element::new(name).attr("xmlns", namespace)
}

fn server_validation(settings: &EapSettings, thumbprints: &[String]) -> Element {
    let validate = !settings.disable_nps_validation;
    let mut el = Element::new("ServerValidation").with(Element::flag(
        "DisableUserPromptForServerValidation",
        validate,
    ));
    if validate {
        el.push(Element::text("ServerNames", settings.nps_servers.join(";")));
    }
    for t in thumbprints {
        el.push(Element::text("TrustedRootCA", t.as_str()));
    }
    el
}

fn eku_filtering(settings: &EapSettings) -> Option<Element> {
    let name = settings.eku_name.as_deref()?;
    let oid = settings.eku_oid.as_deref()?;
    Some(
        ns("TLSExtensions", NS_TLS_V2).with(
            ns("FilteringInfo", NS_TLS_V3)
                .with(
                    Element::new("EKUMapping").with(
                        Element::new("EKUMap")
                            .with(Element::text("EKUName", name))
                            .with(Element::text("EKUOID", oid)),
                    ),
                )
                .with(
                    Element::new("ClientAuthEKUList")
                        .attr("Enabled", "true")
                        .with(Element::new("EKUMapInList").with(Element::text("EKUName", name))),
                ),
        ),
    )
}

/// The `<EapHostConfig>` body for `<Eap><Configuration>`.
pub fn eap_host_config(settings: &EapSettings, thumbprints: &[String]) -> Element {
    let validate = !settings.disable_nps_validation;

    let credentials = if settings.smart_card {
        Element::new("CredentialsSource").with(Element::new("SmartCard"))
    } else {
        Element::new("CredentialsSource").with(
            Element::new("CertificateStore").with(Element::flag("SimpleCertSelection", true)),
        )
    };

    let mut tls = ns("EapType", NS_TLS_V1)
        .with(credentials)
        .with(server_validation(settings, thumbprints))
        .with(Element::flag("DifferentUsername", false))
        .with(ns("PerformServerValidation", NS_TLS_V2).with_text(validate))
        .with(ns("AcceptServerName", NS_TLS_V2).with_text(validate));
    if let Some(filtering) = eku_filtering(settings) {
        tls.push(filtering);
    }

    let inner = ns("Eap", NS_BASE)
        .with(Element::text("Type", EAP_TYPE_TLS))
        .with(tls);

    let peap = ns("EapType", NS_PEAP_V1)
        .with(server_validation(settings, thumbprints))
        .with(Element::flag("FastReconnect", true))
        .with(Element::flag("InnerEapOptional", false))
        .with(inner)
        .with(Element::flag("EnableQuarantineChecks", false))
        .with(Element::flag(
            "RequireCryptoBinding",
            !settings.disable_crypto_binding,
        ))
        .with(
            Element::new("PeapExtensions")
                .with(ns("PerformServerValidation", NS_PEAP_V2).with_text(validate))
                .with(ns("AcceptServerName", NS_PEAP_V2).with_text(validate)),
        );

    let method = Element::new("EapMethod")
        .with(ns("Type", NS_COMMON).with_text_str(EAP_TYPE_PEAP))
        .with(ns("VendorId", NS_COMMON).with_text_str("0"))
        .with(ns("VendorType", NS_COMMON).with_text_str("0"))
        .with(ns("AuthorId", NS_COMMON).with_text_str("0"));

    ns("EapHostConfig", NS_HOST_CONFIG).with(method).with(
        ns("Config", NS_HOST_CONFIG).with(
            ns("Eap", NS_BASE)
                .with(Element::text("Type", EAP_TYPE_PEAP))
                .with(peap),
        ),
    )
}

trait WithText {
    fn with_text(self, value: bool) -> Self;
    fn with_text_str(self, value: &str) -> Self;
}

impl WithText for Element {
    fn with_text(mut self, value: bool) -> Self {
        self.text = if value { "true" } else { "false" }.to_owned();
        self
    }

    fn with_text_str(mut self, value: &str) -> Self {
        value.clone_into(&mut self.text);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::document;

    fn settings() -> EapSettings {
        EapSettings {
            trusted_root_thumbprints: vec!["AA".repeat(20)],
            nps_servers: vec!["nps01.corp.contoso.com".into()],
            eku_name: Some("AOVPN User Authentication".into()),
            eku_oid: Some("1.3.6.1.4.1.311.87".into()),
            ..EapSettings::default()
        }
    }

    #[test]
    fn thumbprints_are_normalized() {
        let spaced = "A1 B2 C3 D4 E5 F6 07 18 29 3A 4B 5C 6D 7E 8F 90 A1 B2 C3 D4";
        let expected = "a1 b2 c3 d4 e5 f6 07 18 29 3a 4b 5c 6d 7e 8f 90 a1 b2 c3 d4";
        assert_eq!(normalize_thumbprint(spaced).as_deref(), Some(expected));
        assert_eq!(
            normalize_thumbprint(&spaced.replace(' ', "")).as_deref(),
            Some(expected)
        );
        assert_eq!(normalize_thumbprint("abcd"), None);
    }

    #[test]
    fn config_carries_validation_and_eku() {
        let s = settings();
        let thumbs: Vec<String> = s
            .trusted_root_thumbprints
            .iter()
            .filter_map(|t| normalize_thumbprint(t))
            .collect();
        let config = eap_host_config(&s, &thumbs);
        let xml = document::render(&config).unwrap();

        let reparsed = document::parse(&xml).unwrap();
        assert_eq!(reparsed, config);
        let mut names = Vec::new();
        reparsed.find_all("ServerNames", &mut names);
        assert_eq!(names.len(), 2);
        assert!(reparsed.find("EKUMapping").is_some());
        assert_eq!(
            reparsed.find("RequireCryptoBinding").map(|e| e.text.as_str()),
            Some("true")
        );
    }

    #[test]
    fn smart_card_and_disabled_validation() {
        let s = EapSettings {
            smart_card: true,
            disable_nps_validation: true,
            ..settings()
        };
        let config = eap_host_config(&s, &[]);
        assert!(config.find("SmartCard").is_some());
        assert!(config.find("ServerNames").is_none());
        assert_eq!(
            config.find("PerformServerValidation").map(|e| e.text.as_str()),
            Some("false")
        );
    }
}
