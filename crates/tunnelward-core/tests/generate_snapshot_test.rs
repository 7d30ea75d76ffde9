// Snapshot tests for generated profile documents.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use tunnelward_api::MemoryHost;
use tunnelward_core::{
    Generator, HostCapability, Profile, ProfileClass, ProfileSettings, VpnStrategy,
};

fn generator() -> Generator {
    Generator::new(HostCapability::new(19045), Arc::new(MemoryHost::new()))
}

fn device_settings() -> ProfileSettings {
    let mut s = ProfileSettings::new(ProfileClass::Machine, "Contoso Device");
    s.external_address = "vpn.contoso.com".into();
    s.strategy = VpnStrategy::Ikev2Only;
    s.include_routes.insert("10.0.0.0/8".into(), String::new());
    s
}

#[test]
fn device_tunnel_document() {
    let outcome = generator().generate(&device_settings());
    assert!(outcome.is_ok(), "{:?}", outcome.failures);
    insta::assert_snapshot!(outcome.document.unwrap(), @"<VPNProfile><AlwaysOn>true</AlwaysOn><RememberCredentials>true</RememberCredentials><DeviceTunnel>true</DeviceTunnel><NativeProfile><Servers>vpn.contoso.com</Servers><RoutingPolicyType>SplitTunnel</RoutingPolicyType><NativeProtocolType>IKEv2</NativeProtocolType><Authentication><MachineMethod>Certificate</MachineMethod></Authentication></NativeProfile><Route><Address>10.0.0.0</Address><PrefixSize>8</PrefixSize><Metric>1</Metric></Route></VPNProfile>");
}

#[test]
fn generated_document_reads_back_equal() {
    let mut settings = device_settings();
    settings.dns_suffixes = vec!["Corp.Contoso.com".into()];
    settings.include_routes.insert("fd00::/8".into(), "lab".into());
    settings.exclude_routes.insert("10.99.0.0/16".into(), String::new());

    let outcome = generator().generate(&settings);
    assert!(outcome.is_ok(), "{:?}", outcome.failures);
    let document = outcome.document.clone().unwrap();
    let reread = Profile::from_document("Contoso Device", &document);
    assert!(reread.load_error.is_empty(), "{}", reread.load_error);
    assert_eq!(outcome.profile.unwrap(), reread);
    assert_eq!(reread.dns_suffixes, vec!["corp.contoso.com"]);
    assert_eq!(reread.routes.iter().filter(|r| r.exclusion).count(), 1);
}
