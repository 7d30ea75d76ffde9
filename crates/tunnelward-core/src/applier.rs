// ── Reconciliation applier ──
//
// Applies one released update to the host. The installed profile is torn
// down and rebuilt only when it differs from the desired one; the entry
// properties the document cannot carry are then drift-corrected on every
// pass, each as its own read-compare-write. A failed correction is reported
// and the rest still run.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tunnelward_api::{
    ConnectionHandle, ConnectionStatus, EntryProperties, Host, InterfaceControl, PhonebookScope,
    ProxySettings,
};

use crate::access::Access;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{EntryOption, EntryOptions, ManagedProfile, Profile};
use crate::phonebook::keys;

/// Longest single sleep between cancellation checks.
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// What one `apply` did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub name: String,
    /// The profile was deleted and created again.
    pub rebuilt: bool,
    pub deleted: bool,
    pub created: bool,
    pub redialed: bool,
    /// Side-artifact records decremented or removed.
    pub artifacts_cleaned: usize,
    pub corrections: Vec<String>,
    pub warnings: Vec<String>,
    /// Auto-trigger registration changed.
    pub restart_required: bool,
}

impl ApplyReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }
}

/// Outcome of one drift correction.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Drift {
    InSync,
    Corrected(String),
    /// The requested value is not written.
    Refused(String),
}

type Correction<'a> = fn(&Applier<'a>, &ManagedProfile) -> Result<Drift, CoreError>;

/// Bring the interface named after profile `name` to `mtu` and read it
/// back. Returns the change made, or `None` when it already matched.
pub(crate) fn sync_mtu(
    interfaces: &dyn InterfaceControl,
    name: &str,
    mtu: u32,
) -> Result<Option<String>, CoreError> {
    let current = interfaces.read_mtu(name)?;
    if current == Some(mtu) {
        return Ok(None);
    }
    interfaces.apply_mtu(name, mtu)?;
    let confirmed = interfaces.read_mtu(name)?;
    if confirmed != Some(mtu) {
        return Err(CoreError::Host {
            message: format!("MTU read-back returned {confirmed:?}, expected {mtu}"),
        });
    }
    Ok(Some(format!(
        "{} -> {mtu}",
        current.map_or_else(|| "unset".to_owned(), |m| m.to_string())
    )))
}

/// Borrowing view over the engine's collaborators for one tick.
pub struct Applier<'a> {
    host: &'a Host,
    access: &'a Access,
    config: &'a EngineConfig,
    cancel: &'a CancellationToken,
}

impl<'a> Applier<'a> {
    pub fn new(
        host: &'a Host,
        access: &'a Access,
        config: &'a EngineConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            host,
            access,
            config,
            cancel,
        }
    }

    /// Apply `update`. `Busy` means the entry stayed in use past the delete
    /// timeout and the update should stay queued.
    pub fn apply(&self, update: &ManagedProfile) -> Result<ApplyReport, CoreError> {
        let mut report = ApplyReport::new(&update.name);
        let scope = update.class.scope();

        if let Some(old) = update
            .old_profile_name
            .as_deref()
            .filter(|old| !old.eq_ignore_ascii_case(&update.name))
        {
            info!(profile = %update.name, old = %old, "removing rename source");
            self.remove(scope, old, &mut report)?;
        }

        let Some(desired) = update.desired() else {
            return self.retire(update, report);
        };

        let live = self.observe(scope, &update.name)?;
        let live_triggers: Vec<String> = live
            .as_ref()
            .map(|p| {
                p.auto_trigger_domains()
                    .into_iter()
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        let was_connected = self.access.connected().contains(&update.name);

        match &live {
            Some(live) if *live == desired => {
                debug!(profile = %update.name, "installed profile matches; skipping rebuild");
            }
            Some(live) => {
                debug!(profile = %update.name, diff = ?live.diff(&desired), "installed profile differs");
                self.rebuild(update, &desired, &mut report)?;
            }
            None => {
                debug!(profile = %update.name, "profile not installed");
                self.rebuild(update, &desired, &mut report)?;
            }
        }

        self.correct_drift(update, &mut report);

        if report.rebuilt && was_connected && update.class.is_device_tunnel() {
            match self.redial(scope, &update.name) {
                Ok(()) => report.redialed = true,
                Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
                Err(e) => {
                    warn!(profile = %update.name, error = %e, "device tunnel redial failed");
                    report.warn(format!("redial: {e}"));
                }
            }
        }

        self.persist(update)?;
        report.restart_required = desired.auto_trigger_domains() != live_triggers;
        Ok(report)
    }

    // ── Live state ───────────────────────────────────────────────────

    /// The installed profile, merged from the bridge and the phonebook.
    fn observe(&self, scope: PhonebookScope, name: &str) -> Result<Option<Profile>, CoreError> {
        let Some(xml) = self.host.bridge.get(name)? else {
            return Ok(None);
        };
        let section = self
            .access
            .with_phonebook(|| self.host.phonebook.read_section(scope, name))?;
        Ok(Some(Profile::from_bridge_and_phonebook(
            name,
            &xml,
            section.as_ref(),
        )))
    }

    // ── Teardown ─────────────────────────────────────────────────────

    fn retire(
        &self,
        update: &ManagedProfile,
        mut report: ApplyReport,
    ) -> Result<ApplyReport, CoreError> {
        let scope = update.class.scope();
        let had_triggers = self
            .observe(scope, &update.name)?
            .is_some_and(|p| !p.auto_trigger_domains().is_empty());

        self.remove(scope, &update.name, &mut report)?;

        let class = update.class.to_string();
        let stored = self.host.state.load_managed(&class)?;
        if stored.is_some_and(|s| s.eq_ignore_ascii_case(&update.name)) {
            self.host.state.clear_managed(&class)?;
        }
        report.restart_required = had_triggers;
        info!(profile = %update.name, deleted = report.deleted, "profile retired");
        Ok(report)
    }

    /// Delete the named entry, retrying while it is in use, then clean up
    /// the side artifacts that reference it. A missing entry counts as
    /// deleted already.
    fn remove(
        &self,
        scope: PhonebookScope,
        name: &str,
        report: &mut ApplyReport,
    ) -> Result<(), CoreError> {
        let started = Instant::now();
        let deadline = started + self.config.delete_timeout();
        loop {
            let result = self
                .access
                .with_phonebook(|| self.host.connections.delete_entry(scope, name));
            match result {
                Ok(()) => {
                    report.deleted = true;
                    break;
                }
                Err(e) if e.is_not_found() => break,
                Err(e) if e.is_in_use() => {
                    if self.cancel.is_cancelled() {
                        return Err(CoreError::Cancelled);
                    }
                    if Instant::now() >= deadline {
                        return Err(CoreError::Busy {
                            name: name.to_owned(),
                            message: format!(
                                "still in use after {}s",
                                started.elapsed().as_secs()
                            ),
                        });
                    }
                    debug!(profile = %name, "entry in use; disconnecting before retry");
                    self.disconnect(name, deadline)?;
                    self.pause(self.config.delete_retry_pause())?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        match self.clean_artifacts(name) {
            Ok(count) => report.artifacts_cleaned += count,
            Err(e) => {
                warn!(profile = %name, error = %e, "artifact cleanup failed");
                report.warn(format!("artifact cleanup: {e}"));
            }
        }
        Ok(())
    }

    /// Hang up every active handle for `name` and wait for each to drop.
    fn disconnect(&self, name: &str, deadline: Instant) -> Result<(), CoreError> {
        let handles = self.access.with_phonebook(
            || -> Result<Vec<ConnectionHandle>, CoreError> {
                let handles: Vec<ConnectionHandle> = self
                    .host
                    .connections
                    .list_active()?
                    .into_iter()
                    .filter(|c| c.name.eq_ignore_ascii_case(name))
                    .map(|c| c.handle)
                    .collect();
                for handle in &handles {
                    self.host.connections.hangup(*handle)?;
                }
                Ok(handles)
            },
        )?;

        for handle in handles {
            loop {
                if self.cancel.is_cancelled() {
                    return Err(CoreError::Cancelled);
                }
                let status = self
                    .access
                    .with_phonebook(|| self.host.connections.status(handle))?;
                if status == ConnectionStatus::Disconnected {
                    break;
                }
                if Instant::now() >= deadline {
                    warn!(profile = %name, ?status, "connection did not drop before deadline");
                    break;
                }
                self.pause(self.config.poll_interval())?;
            }
        }
        Ok(())
    }

    fn clean_artifacts(&self, name: &str) -> Result<usize, CoreError> {
        let artifacts = &self.host.artifacts;
        let mut cleaned = 0;

        for resource in artifacts
            .tracked_resources()?
            .into_iter()
            .filter(|r| r.profile.eq_ignore_ascii_case(name))
        {
            if resource.count > 1 {
                artifacts.set_tracked_count(&resource.key, resource.count - 1)?;
            } else {
                artifacts.remove_tracked(&resource.key)?;
            }
            cleaned += 1;
        }

        for binding in artifacts
            .network_bindings()?
            .into_iter()
            .filter(|b| b.profile.eq_ignore_ascii_case(name))
        {
            artifacts.remove_network_binding(&binding.id)?;
            cleaned += 1;
        }

        let disabled = artifacts.auto_trigger_disabled()?;
        if disabled.iter().any(|p| p.eq_ignore_ascii_case(name)) {
            let kept: Vec<String> = disabled
                .into_iter()
                .filter(|p| !p.eq_ignore_ascii_case(name))
                .collect();
            artifacts.set_auto_trigger_disabled(&kept)?;
            cleaned += 1;
        }

        if cleaned > 0 {
            debug!(profile = %name, cleaned, "side artifacts cleaned");
        }
        Ok(cleaned)
    }

    // ── Rebuild ──────────────────────────────────────────────────────

    fn rebuild(
        &self,
        update: &ManagedProfile,
        desired: &Profile,
        report: &mut ApplyReport,
    ) -> Result<(), CoreError> {
        let scope = update.class.scope();
        self.remove(scope, &update.name, report)?;
        self.host.bridge.create(&update.name, &update.document)?;
        report.created = true;
        report.rebuilt = true;
        info!(profile = %update.name, class = %update.class, "profile created");

        self.pause(self.config.settle_delay())?;
        self.verify(update, desired, report)
    }

    /// Re-read the profile after create. A mismatch is reported, never
    /// rolled back.
    fn verify(
        &self,
        update: &ManagedProfile,
        desired: &Profile,
        report: &mut ApplyReport,
    ) -> Result<(), CoreError> {
        let fields = match self.observe(update.class.scope(), &update.name)? {
            Some(live) if live == *desired => return Ok(()),
            Some(live) => live
                .diff(desired)
                .iter()
                .map(|(field, mismatch)| format!("{field}: {mismatch}"))
                .collect::<Vec<_>>()
                .join("; "),
            None => "profile missing after create".to_owned(),
        };
        let mismatch = CoreError::VerificationMismatch {
            profile: update.name.clone(),
            fields,
        };
        warn!(profile = %update.name, error = %mismatch, "post-create verification failed");
        report.warn(mismatch.to_string());
        Ok(())
    }

    /// Dial `name` and wait until it connects.
    fn redial(&self, scope: PhonebookScope, name: &str) -> Result<(), CoreError> {
        let handle = self
            .access
            .with_phonebook(|| self.host.connections.dial(scope, name))?;
        let deadline = Instant::now() + self.config.delete_timeout();
        loop {
            if self.cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            let status = self
                .access
                .with_phonebook(|| self.host.connections.status(handle))?;
            match status {
                ConnectionStatus::Connected => {
                    info!(profile = %name, "device tunnel redialed");
                    return Ok(());
                }
                ConnectionStatus::Disconnected => {
                    return Err(CoreError::Host {
                        message: format!("'{name}' dropped while connecting"),
                    });
                }
                ConnectionStatus::Connecting | ConnectionStatus::Disconnecting => {}
            }
            if Instant::now() >= deadline {
                return Err(CoreError::Busy {
                    name: name.to_owned(),
                    message: "still connecting".into(),
                });
            }
            self.pause(self.config.poll_interval())?;
        }
    }

    // ── Drift correction ─────────────────────────────────────────────

    fn correct_drift(&self, update: &ManagedProfile, report: &mut ApplyReport) {
        let corrections: [(&str, Correction<'a>); 7] = [
            ("interface metric", Self::correct_metric),
            ("strategy", Self::correct_strategy),
            ("credentials", Self::correct_credentials),
            ("network outage", Self::correct_outage),
            ("machine EKU filter", Self::correct_eku_filter),
            ("proxy", Self::correct_proxy),
            ("mtu", Self::correct_mtu),
        ];
        for (what, correct) in corrections {
            match correct(self, update) {
                Ok(Drift::InSync) => {}
                Ok(Drift::Corrected(change)) => {
                    info!(profile = %update.name, correction = what, %change, "drift corrected");
                    report.corrections.push(format!("{what}: {change}"));
                }
                Ok(Drift::Refused(message)) => {
                    warn!(profile = %update.name, correction = what, %message, "correction refused");
                    report.warn(format!("{what}: {message}"));
                }
                Err(e) => {
                    warn!(profile = %update.name, correction = what, error = %e, "drift correction failed");
                    report.warn(format!("{what}: {e}"));
                }
            }
        }
    }

    /// Read the entry, let `edit` change it, and write it back only if
    /// `edit` reports a change.
    fn edit_entry(
        &self,
        update: &ManagedProfile,
        edit: impl FnOnce(&mut EntryProperties) -> Option<String>,
    ) -> Result<Drift, CoreError> {
        let scope = update.class.scope();
        self.access.with_phonebook(|| -> Result<Drift, CoreError> {
            let mut properties = self.host.connections.get_entry(scope, &update.name)?;
            match edit(&mut properties) {
                None => Ok(Drift::InSync),
                Some(change) => {
                    self.host
                        .connections
                        .set_entry(scope, &update.name, &properties)?;
                    Ok(Drift::Corrected(change))
                }
            }
        })
    }

    fn correct_metric(&self, update: &ManagedProfile) -> Result<Drift, CoreError> {
        let Some(metric) = update.attributes.interface_metric else {
            return Ok(Drift::InSync);
        };
        self.edit_entry(update, |p| {
            let mut options = EntryOptions::from_raw(p.options2);
            let explicit = options.contains(EntryOption::Ipv4ExplicitMetric)
                && options.contains(EntryOption::Ipv6ExplicitMetric);
            if explicit && p.ipv4_interface_metric == metric && p.ipv6_interface_metric == metric
            {
                return None;
            }
            let change = format!("{} -> {metric}", p.ipv4_interface_metric);
            p.ipv4_interface_metric = metric;
            p.ipv6_interface_metric = metric;
            options.insert(EntryOption::Ipv4ExplicitMetric);
            options.insert(EntryOption::Ipv6ExplicitMetric);
            p.options2 = options.raw();
            Some(change)
        })
    }

    fn correct_strategy(&self, update: &ManagedProfile) -> Result<Drift, CoreError> {
        let Some(strategy) = update.attributes.strategy else {
            return Ok(Drift::InSync);
        };
        if strategy.is_rejected() {
            return Ok(Drift::Refused(format!(
                "{strategy} is not supported; entry left unchanged"
            )));
        }
        self.edit_entry(update, |p| {
            (p.vpn_strategy != strategy.raw()).then(|| {
                let change = format!("{} -> {strategy}", p.vpn_strategy);
                p.vpn_strategy = strategy.raw();
                change
            })
        })
    }

    fn correct_credentials(&self, update: &ManagedProfile) -> Result<Drift, CoreError> {
        let wanted = update.attributes.disable_credentials;
        self.edit_entry(update, |p| {
            let mut options = EntryOptions::from_raw(p.options2);
            (options.contains(EntryOption::DontUseRasCredentials) != wanted).then(|| {
                options.set(EntryOption::DontUseRasCredentials, wanted);
                p.options2 = options.raw();
                format!("DontUseRasCredentials -> {wanted}")
            })
        })
    }

    /// A zero timer disables mobility instead of being written.
    fn correct_outage(&self, update: &ManagedProfile) -> Result<Drift, CoreError> {
        let Some(seconds) = update.attributes.network_outage_time else {
            return Ok(Drift::InSync);
        };
        self.edit_entry(update, |p| {
            let mut options = EntryOptions::from_raw(p.options2);
            let mobility_disabled = options.contains(EntryOption::DisableMobility);
            if seconds == 0 {
                if mobility_disabled {
                    return None;
                }
                options.insert(EntryOption::DisableMobility);
                p.options2 = options.raw();
                return Some("mobility disabled".to_owned());
            }
            if !mobility_disabled && p.network_outage_time == seconds {
                return None;
            }
            let change = format!("{}s -> {seconds}s", p.network_outage_time);
            options.remove(EntryOption::DisableMobility);
            p.options2 = options.raw();
            p.network_outage_time = seconds;
            Some(change)
        })
    }

    fn correct_eku_filter(&self, update: &ManagedProfile) -> Result<Drift, CoreError> {
        if !update.class.is_device_tunnel() {
            return Ok(Drift::InSync);
        }
        let Some(filter) = update.attributes.machine_eku_filter.as_deref() else {
            return Ok(Drift::InSync);
        };
        let scope = update.class.scope();
        let phonebook = &self.host.phonebook;
        self.access.with_phonebook(|| -> Result<Drift, CoreError> {
            let section = phonebook.read_section(scope, &update.name)?.ok_or_else(|| {
                CoreError::NotFound {
                    resource: "phonebook entry".into(),
                    name: update.name.clone(),
                }
            })?;
            if section.get(keys::MACHINE_EKU_FILTER) == Some(filter) {
                return Ok(Drift::InSync);
            }
            phonebook.write_value(scope, &update.name, keys::MACHINE_EKU_FILTER, filter)?;
            Ok(Drift::Corrected(format!("-> {filter}")))
        })
    }

    /// Exceptions and bypass-for-local mean nothing without a server.
    fn correct_proxy(&self, update: &ManagedProfile) -> Result<Drift, CoreError> {
        let Some(server) = update.proxy_server() else {
            return Ok(Drift::InSync);
        };
        let wanted = ProxySettings {
            server: Some(server.to_owned()),
            exceptions: update.attributes.proxy_exceptions.clone(),
            bypass_local: update.attributes.proxy_bypass_local,
        };
        let scope = update.class.scope();
        let connections = &self.host.connections;
        self.access.with_phonebook(|| -> Result<Drift, CoreError> {
            let current = connections.get_proxy(scope, &update.name)?;
            if same_proxy(&current, &wanted) {
                return Ok(Drift::InSync);
            }
            connections.set_proxy(scope, &update.name, &wanted)?;
            Ok(Drift::Corrected(format!(
                "{server} with {} exception(s), bypass local {}",
                wanted.exceptions.len(),
                wanted.bypass_local
            )))
        })
    }

    fn correct_mtu(&self, update: &ManagedProfile) -> Result<Drift, CoreError> {
        let Some(mtu) = update.attributes.mtu else {
            return Ok(Drift::InSync);
        };
        Ok(match sync_mtu(self.host.interfaces.as_ref(), &update.name, mtu)? {
            Some(change) => Drift::Corrected(change),
            None => Drift::InSync,
        })
    }

    // ── State ────────────────────────────────────────────────────────

    fn persist(&self, update: &ManagedProfile) -> Result<(), CoreError> {
        let class = update.class.to_string();
        let stored = self.host.state.load_managed(&class)?;
        if stored.as_deref() != Some(update.name.as_str()) {
            self.host.state.save_managed(&class, &update.name)?;
            debug!(profile = %update.name, class = %class, "managed name persisted");
        }
        Ok(())
    }

    /// Sleep for `duration` in short slices, stopping early on cancel.
    fn pause(&self, duration: Duration) -> Result<(), CoreError> {
        let end = Instant::now() + duration;
        loop {
            if self.cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            let now = Instant::now();
            if now >= end {
                return Ok(());
            }
            std::thread::sleep((end - now).min(PAUSE_SLICE));
        }
    }
}

/// Exception lists compare as case-insensitive sets.
fn same_proxy(a: &ProxySettings, b: &ProxySettings) -> bool {
    let normalized = |list: &[String]| {
        let mut out: Vec<String> = list.iter().map(|e| e.to_ascii_lowercase()).collect();
        out.sort_unstable();
        out.dedup();
        out
    };
    a.server == b.server
        && a.bypass_local == b.bypass_local
        && normalized(&a.exceptions) == normalized(&b.exceptions)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{ProfileClass, RuntimeAttributes, VpnStrategy};
    use crate::phonebook::materialize;
    use pretty_assertions::assert_eq;
    use tunnelward_api::{HostCall, MemoryHost, NetworkBinding, TrackedResource};

    const DOC: &str = "<VPNProfile><AlwaysOn>true</AlwaysOn>\
        <NativeProfile><Servers>vpn.contoso.com</Servers></NativeProfile></VPNProfile>";

    struct Fixture {
        memory: Arc<MemoryHost>,
        host: Host,
        access: Access,
        config: EngineConfig,
        cancel: CancellationToken,
    }

    impl Fixture {
        fn new() -> Self {
            let memory = Arc::new(MemoryHost::new().with_materializer(materialize));
            Self {
                host: Host::from_shared(memory.clone()),
                memory,
                access: Access::new(),
                config: EngineConfig::immediate(),
                cancel: CancellationToken::new(),
            }
        }

        fn apply(&self, update: &ManagedProfile) -> Result<ApplyReport, CoreError> {
            Applier::new(&self.host, &self.access, &self.config, &self.cancel).apply(update)
        }
    }

    fn update(attributes: RuntimeAttributes) -> ManagedProfile {
        ManagedProfile::new("Corp", ProfileClass::User, DOC, attributes)
    }

    #[test]
    fn fresh_profile_is_created_and_persisted() {
        let f = Fixture::new();
        let report = f.apply(&update(RuntimeAttributes::default())).unwrap();
        assert!(report.created);
        assert!(!report.deleted);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(
            f.memory.snapshot().managed.get("user").map(String::as_str),
            Some("Corp")
        );
    }

    #[test]
    fn strategy_and_outage_are_written_to_the_entry() {
        let f = Fixture::new();
        let attributes = RuntimeAttributes {
            strategy: Some(VpnStrategy::Ikev2Only),
            network_outage_time: Some(0),
            interface_metric: Some(3),
            ..RuntimeAttributes::default()
        };
        let report = f.apply(&update(attributes)).unwrap();
        assert_eq!(report.corrections.len(), 3, "{:?}", report.corrections);

        let entry = f.memory.snapshot().current_user["Corp"].properties.clone();
        assert_eq!(entry.vpn_strategy, VpnStrategy::Ikev2Only.raw());
        assert_eq!(entry.ipv4_interface_metric, 3);
        let options = EntryOptions::from_raw(entry.options2);
        assert!(options.contains(EntryOption::DisableMobility));
        assert!(options.contains(EntryOption::Ipv6ExplicitMetric));
    }

    #[test]
    fn rejected_strategy_is_never_written() {
        let f = Fixture::new();
        let attributes = RuntimeAttributes {
            strategy: Some(VpnStrategy::PptpSstp),
            ..RuntimeAttributes::default()
        };
        let report = f.apply(&update(attributes)).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(f
            .memory
            .mutations()
            .iter()
            .all(|c| !matches!(c, HostCall::SetEntry { .. })));
    }

    #[test]
    fn proxy_exceptions_need_a_proxy_server() {
        let f = Fixture::new();
        let attributes = RuntimeAttributes {
            proxy_exceptions: vec!["*.contoso.com".into()],
            proxy_bypass_local: true,
            ..RuntimeAttributes::default()
        };
        f.apply(&update(attributes.clone())).unwrap();
        assert!(f
            .memory
            .mutations()
            .iter()
            .all(|c| !matches!(c, HostCall::SetProxy { .. })));

        let with_proxy = ManagedProfile::new(
            "Corp",
            ProfileClass::User,
            DOC.replace(
                "<NativeProfile>",
                "<Proxy><Manual><Server>proxy:8080</Server></Manual></Proxy><NativeProfile>",
            ),
            attributes,
        );
        f.apply(&with_proxy).unwrap();
        let proxy = f.memory.snapshot().current_user["Corp"].proxy.clone();
        assert_eq!(proxy.server.as_deref(), Some("proxy:8080"));
        assert!(proxy.bypass_local);
    }

    #[test]
    fn delete_cleans_only_matching_artifacts() {
        let f = Fixture::new();
        f.memory.install("Corp", DOC);
        f.memory.edit(|s| {
            s.tracked = vec![
                TrackedResource { key: "a".into(), profile: "Corp".into(), count: 2 },
                TrackedResource { key: "b".into(), profile: "Corp".into(), count: 1 },
                TrackedResource { key: "c".into(), profile: "Other".into(), count: 1 },
            ];
            s.bindings = vec![
                NetworkBinding { id: "n1".into(), profile: "corp".into() },
                NetworkBinding { id: "n2".into(), profile: "Other".into() },
            ];
            s.auto_trigger_disabled = vec!["Other".into()];
            s.managed.insert("user".into(), "Corp".into());
        });

        let report = f
            .apply(&ManagedProfile::tombstone("Corp", ProfileClass::User))
            .unwrap();
        assert!(report.deleted);
        assert_eq!(report.artifacts_cleaned, 3);

        let snapshot = f.memory.snapshot();
        let tracked: Vec<(&str, u32)> = snapshot
            .tracked
            .iter()
            .map(|r| (r.key.as_str(), r.count))
            .collect();
        assert_eq!(tracked, vec![("a", 1), ("c", 1)]);
        assert_eq!(snapshot.bindings.len(), 1);
        assert!(!f.memory.mutations().contains(&HostCall::SetAutoTriggerDisabled));
        assert!(snapshot.managed.is_empty());
    }

    #[test]
    fn in_use_delete_disconnects_and_retries() {
        let f = Fixture::new();
        f.memory.install("Corp", "<VPNProfile/>");
        f.memory.connect("Corp");
        f.memory.script_in_use("Corp", 1);

        let report = f.apply(&update(RuntimeAttributes::default())).unwrap();
        assert!(report.rebuilt);
        let hangups = f
            .memory
            .calls()
            .iter()
            .filter(|c| matches!(c, HostCall::Hangup { .. }))
            .count();
        assert_eq!(hangups, 1);
    }

    #[test]
    fn cancellation_stops_the_retry_loop() {
        let f = Fixture::new();
        f.memory.install("Corp", "<VPNProfile/>");
        f.memory.script_in_use("Corp", 5);
        f.cancel.cancel();
        let err = f.apply(&update(RuntimeAttributes::default())).unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
    }

    #[test]
    fn cancellation_interrupts_the_disconnect_wait() {
        let mut f = Fixture::new();
        f.config.poll_interval_ms = 5;
        f.memory.install("Corp", "<VPNProfile/>");
        f.memory.connect("Corp");
        f.memory.script_lingering("Corp");

        let cancel = f.cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            cancel.cancel();
        });
        let started = Instant::now();
        let err = f.apply(&update(RuntimeAttributes::default())).unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, CoreError::Cancelled));
        assert!(started.elapsed() < f.config.delete_timeout());
        let calls = f.memory.calls();
        assert!(calls.iter().any(|c| matches!(c, HostCall::Hangup { .. })));
        assert!(calls.iter().any(|c| matches!(c, HostCall::Status { .. })));
        assert!(!calls.iter().any(|c| matches!(c, HostCall::Create { .. })));
        assert!(f.memory.snapshot().documents.contains_key("Corp"));
    }

    #[test]
    fn lossy_phonebook_is_reported_after_create() {
        let memory = Arc::new(MemoryHost::new().with_materializer(|doc: &str| {
            let (scope, mut section) = materialize(doc);
            section.set(keys::NUM_ROUTES, "0");
            (scope, section)
        }));
        let f = Fixture {
            host: Host::from_shared(memory.clone()),
            memory,
            ..Fixture::new()
        };
        let routed = ManagedProfile::new(
            "Corp",
            ProfileClass::User,
            DOC.replace(
                "</NativeProfile>",
                "</NativeProfile><Route><Address>10.0.0.0</Address>\
                <PrefixSize>8</PrefixSize></Route>",
            ),
            RuntimeAttributes::default(),
        );

        let report = f.apply(&routed).unwrap();
        assert!(report.created);
        assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
        assert!(
            report.warnings[0].contains("does not match after create: Route: "),
            "{}",
            report.warnings[0]
        );
        assert_eq!(
            f.memory.snapshot().managed.get("user").map(String::as_str),
            Some("Corp")
        );
    }

    #[test]
    fn device_tunnel_is_redialed_after_rebuild() {
        let f = Fixture::new();
        f.memory.install("Device", "<VPNProfile><DeviceTunnel>true</DeviceTunnel></VPNProfile>");
        f.memory.connect("Device");
        f.access.connected().names = vec!["Device".into()];

        let device = ManagedProfile::new(
            "Device",
            ProfileClass::Machine,
            DOC.replace(
                "<AlwaysOn>true</AlwaysOn>",
                "<AlwaysOn>true</AlwaysOn><DeviceTunnel>true</DeviceTunnel>",
            ),
            RuntimeAttributes {
                machine_eku_filter: Some("1.3.6.1.5.5.7.3.2".into()),
                ..RuntimeAttributes::default()
            },
        );
        let report = f.apply(&device).unwrap();
        assert!(report.rebuilt);
        assert!(report.redialed);
        let section = f.memory.snapshot().all_users["Device"].section.clone();
        assert_eq!(section.get(keys::MACHINE_EKU_FILTER), Some("1.3.6.1.5.5.7.3.2"));
    }

    #[test]
    fn proxy_comparison_ignores_exception_order() {
        let a = ProxySettings {
            server: Some("p:80".into()),
            exceptions: vec!["B".into(), "a".into()],
            bypass_local: false,
        };
        let b = ProxySettings {
            exceptions: vec!["a".into(), "b".into()],
            ..a.clone()
        };
        assert!(same_proxy(&a, &b));
    }
}
