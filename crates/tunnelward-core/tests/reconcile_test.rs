// Integration tests driving the engine against the in-memory host.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use tunnelward_api::{HostCall, MemoryHost, NetworkBinding};

use tunnelward_core::phonebook::{keys, materialize};
use tunnelward_core::settings::EapSettings;
use tunnelward_core::{
    Engine, EngineConfig, Generator, HostCapability, ManagedProfile, ProfileClass,
    ProfileSettings, RuntimeAttributes, VpnStrategy,
};

// ── Helpers ─────────────────────────────────────────────────────────

const DNI_DOC: &str = "<VPNProfile><AlwaysOn>true</AlwaysOn>\
    <DomainNameInformation><DomainName>.corp.contoso.com</DomainName>\
    <DnsServers>10.0.0.53</DnsServers><AutoTrigger>true</AutoTrigger></DomainNameInformation>\
    <NativeProfile><Servers>vpn.contoso.com</Servers></NativeProfile></VPNProfile>";

fn setup_with(config: EngineConfig) -> (Arc<MemoryHost>, Engine) {
    let memory = Arc::new(MemoryHost::new().with_materializer(materialize));
    let engine = Engine::new(
        tunnelward_api::Host::from_shared(memory.clone()),
        config,
        CancellationToken::new(),
    );
    (memory, engine)
}

fn setup() -> (Arc<MemoryHost>, Engine) {
    setup_with(EngineConfig::immediate())
}

fn user_settings() -> ProfileSettings {
    let mut s = ProfileSettings::new(ProfileClass::User, "Contoso VPN");
    s.external_address = "vpn.contoso.com".into();
    s.include_routes.insert("10.0.0.0/8".into(), "corp".into());
    s.exclude_routes.insert("10.99.0.0/16".into(), String::new());
    s.dns_suffixes = vec!["corp.contoso.com".into()];
    s.trusted_networks = vec!["corp.contoso.com".into()];
    s.interface_metric = Some(3);
    s.network_outage_time = Some(0);
    s.eap = EapSettings {
        trusted_root_thumbprints: vec!["3f".repeat(20)],
        nps_servers: vec!["nps01.corp.contoso.com".into()],
        ..EapSettings::default()
    };
    s
}

fn generated(memory: &Arc<MemoryHost>, settings: &ProfileSettings) -> ManagedProfile {
    let generator = Generator::new(HostCapability::new(19045), memory.clone());
    let outcome = generator.generate(settings);
    assert!(outcome.is_ok(), "{:?}", outcome.failures);
    outcome.into_managed().unwrap()
}

// ── Idempotence ─────────────────────────────────────────────────────

#[test]
fn second_pass_over_identical_state_mutates_nothing() {
    let (memory, engine) = setup();
    let update = generated(&memory, &user_settings());

    engine.schedule_upsert(update.clone());
    let first = engine.tick();
    assert_eq!(first.applied.len(), 1);
    assert!(first.applied[0].created);
    assert!(first.applied[0].warnings.is_empty(), "{:?}", first.applied[0].warnings);

    memory.clear_calls();
    engine.schedule_upsert(update);
    let second = engine.tick();
    assert_eq!(second.applied.len(), 1);
    assert!(!second.applied[0].rebuilt);
    assert!(second.applied[0].corrections.is_empty());
    assert_eq!(memory.mutations(), Vec::<HostCall>::new());
}

#[test]
fn drifted_entry_properties_are_corrected_without_rebuild() {
    let (memory, engine) = setup();
    let update = generated(&memory, &user_settings());
    engine.schedule_upsert(update.clone());
    engine.tick();

    memory.edit(|s| {
        let entry = s.current_user.get_mut("Contoso VPN").unwrap();
        entry.properties.vpn_strategy = VpnStrategy::SstpOnly.raw();
        entry.properties.ipv4_interface_metric = 50;
    });
    memory.clear_calls();

    engine.schedule_upsert(update);
    let report = engine.tick();
    let applied = &report.applied[0];
    assert!(!applied.rebuilt);
    assert_eq!(applied.corrections.len(), 2, "{:?}", applied.corrections);
    assert!(memory.mutations().iter().all(|c| matches!(c, HostCall::SetEntry { .. })));

    let entry = memory.snapshot().current_user["Contoso VPN"].properties.clone();
    assert_eq!(entry.vpn_strategy, VpnStrategy::Ikev2First.raw());
    assert_eq!(entry.ipv4_interface_metric, 3);
}

// ── MTU ─────────────────────────────────────────────────────────────

#[test]
fn mtu_drift_applies_once_and_reads_back() {
    let (memory, engine) = setup();
    engine.schedule_upsert(generated(&memory, &user_settings()));
    engine.tick();
    memory.edit(|s| {
        s.interfaces.insert("Contoso VPN".into(), 1500);
    });
    memory.clear_calls();

    assert!(engine.update_mtu("Contoso VPN", 1400).unwrap());
    assert_eq!(engine.tick().pending, 0);

    let mtu_calls: Vec<HostCall> = memory
        .calls()
        .into_iter()
        .filter(|c| matches!(c, HostCall::ReadMtu { .. } | HostCall::ApplyMtu { .. }))
        .collect();
    let read = HostCall::ReadMtu {
        interface: "Contoso VPN".into(),
    };
    assert_eq!(
        mtu_calls,
        vec![
            read.clone(),
            HostCall::ApplyMtu {
                interface: "Contoso VPN".into(),
                mtu: 1400,
            },
            read,
        ]
    );
    assert_eq!(
        memory.mutations(),
        vec![HostCall::ApplyMtu {
            interface: "Contoso VPN".into(),
            mtu: 1400,
        }]
    );
}

// ── Verification ────────────────────────────────────────────────────

#[test]
fn verification_mismatch_is_a_warning_not_a_retry() {
    // The host drops every route from the phonebook on install.
    let memory = Arc::new(MemoryHost::new().with_materializer(|doc: &str| {
        let (scope, mut section) = materialize(doc);
        section.set(keys::NUM_ROUTES, "0");
        (scope, section)
    }));
    let engine = Engine::new(
        tunnelward_api::Host::from_shared(memory.clone()),
        EngineConfig::immediate(),
        CancellationToken::new(),
    );
    engine.schedule_upsert(generated(&memory, &user_settings()));

    let report = engine.tick();
    let applied = &report.applied[0];
    assert!(applied.created);
    assert!(
        applied
            .warnings
            .iter()
            .any(|w| w.contains("does not match after create: Route: ")),
        "{:?}",
        applied.warnings
    );
    assert_eq!(report.pending, 0);
    assert_eq!(engine.managed_names(), vec!["Contoso VPN"]);
}

// ── Deletes and renames ─────────────────────────────────────────────

#[test]
fn delete_of_connected_profile_disconnects_and_cleans_up() {
    let config = EngineConfig {
        allow_updates_while_connected: true,
        ..EngineConfig::immediate()
    };
    let (memory, engine) = setup_with(config);
    engine.schedule_upsert(generated(&memory, &user_settings()));
    engine.tick();

    memory.connect("Contoso VPN");
    memory.script_in_use("Contoso VPN", 2);
    memory.edit(|s| {
        s.bindings.push(NetworkBinding {
            id: "{net-1}".into(),
            profile: "Contoso VPN".into(),
        });
    });

    engine.schedule_delete("Contoso VPN", ProfileClass::User);
    let report = engine.tick();
    assert_eq!(report.applied.len(), 1, "{report:?}");
    assert!(report.applied[0].deleted);
    assert_eq!(report.applied[0].artifacts_cleaned, 1);

    let snapshot = memory.snapshot();
    assert!(snapshot.active.is_empty());
    assert!(snapshot.documents.is_empty());
    assert!(snapshot.bindings.is_empty());
    assert!(snapshot.managed.is_empty());
    assert!(engine.managed_names().is_empty());
}

#[test]
fn configured_name_change_renames_the_managed_profile() {
    let (memory, engine) = setup();
    engine.schedule_upsert(generated(&memory, &user_settings()));
    engine.tick();

    let mut renamed = user_settings();
    renamed.name = "Contoso Corporate".into();
    engine.schedule_upsert(generated(&memory, &renamed));
    let report = engine.tick();
    assert_eq!(report.applied.len(), 1);

    let snapshot = memory.snapshot();
    assert!(!snapshot.documents.contains_key("Contoso VPN"));
    assert!(snapshot.documents.contains_key("Contoso Corporate"));
    assert_eq!(
        snapshot.managed.get("user").map(String::as_str),
        Some("Contoso Corporate")
    );
    assert_eq!(engine.managed_names(), vec!["Contoso Corporate"]);
}

#[test]
fn rename_waits_while_its_source_is_connected() {
    let (memory, engine) = setup();
    engine.schedule_upsert(generated(&memory, &user_settings()));
    engine.tick();
    memory.connect("Contoso VPN");

    let mut renamed = user_settings();
    renamed.name = "Contoso Corporate".into();
    engine.schedule_upsert(generated(&memory, &renamed));
    let report = engine.tick();
    assert!(report.applied.is_empty());
    assert_eq!(report.pending, 1);

    memory.edit(|s| s.active.clear());
    let report = engine.tick();
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.pending, 0);
}

#[test]
fn state_survives_an_engine_restart() {
    let (memory, engine) = setup();
    engine.schedule_upsert(generated(&memory, &user_settings()));
    engine.tick();
    drop(engine);

    let restarted = Engine::new(
        tunnelward_api::Host::from_shared(memory.clone()),
        EngineConfig::immediate(),
        CancellationToken::new(),
    );
    assert_eq!(restarted.seed_from_state().unwrap(), 1);
    assert_eq!(restarted.managed_names(), vec!["Contoso VPN"]);

    // The adopted profile still takes an MTU change while connected.
    memory.connect("Contoso VPN");
    assert!(restarted.update_mtu("Contoso VPN", 1300).unwrap());
    assert_eq!(memory.snapshot().interfaces.get("Contoso VPN"), Some(&1300));
    assert_eq!(restarted.pending_count(), 0);
}

// ── Service restart ─────────────────────────────────────────────────

#[test]
fn auto_trigger_change_restarts_service_once_connections_drop() {
    let (memory, engine) = setup();
    memory.connect("Someone Else");
    engine.schedule_upsert(ManagedProfile::new(
        "Contoso VPN",
        ProfileClass::User,
        DNI_DOC,
        RuntimeAttributes::default(),
    ));

    let report = engine.tick();
    assert!(report.applied[0].restart_required);
    assert!(!report.restart_issued);
    assert!(engine.restart().is_requested());
    assert!(memory.snapshot().restarts.is_empty());

    memory.edit(|s| s.active.clear());
    let report = engine.tick();
    assert!(report.restart_issued);
    assert_eq!(memory.snapshot().restarts, vec!["RasMan"]);

    let report = engine.tick();
    assert!(!report.restart_issued);
    assert_eq!(memory.snapshot().restarts.len(), 1);
}
