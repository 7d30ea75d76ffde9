// ── Reconciliation engine ──
//
// Owns the scheduler, the access layer and the restart coordinator, and
// drives one tick at a time: refresh the connected-names cache, release the
// eligible updates, apply each in isolation, fold the successes into the
// managed set. All host calls are blocking; `run` executes ticks on the
// blocking pool, periodically with jitter and eagerly on triggers.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use strum::IntoEnumIterator;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tunnelward_api::{ConnectionStatus, Host};

use crate::access::Access;
use crate::applier::{Applier, ApplyReport, sync_mtu};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{ManagedProfile, ProfileClass, RuntimeAttributes};
use crate::restart::RestartCoordinator;
use crate::scheduler::Scheduler;

/// Host notifications that warrant an eager tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TickTrigger {
    ConnectionChanged,
    PolicyRefresh,
    NetworkChanged,
}

/// An update that failed this tick. It stays queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickFailure {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub connected: Vec<String>,
    pub applied: Vec<ApplyReport>,
    /// Busy this tick; retried on the next one.
    pub deferred: Vec<String>,
    pub failed: Vec<TickFailure>,
    /// Still queued after the tick.
    pub pending: usize,
    pub restart_issued: bool,
}

pub struct Engine {
    host: Host,
    access: Arc<Access>,
    scheduler: Scheduler,
    config: EngineConfig,
    cancel: CancellationToken,
    restart: RestartCoordinator,
}

impl Engine {
    pub fn new(host: Host, config: EngineConfig, cancel: CancellationToken) -> Self {
        let access = Arc::new(Access::new());
        Self {
            restart: RestartCoordinator::new(Arc::clone(&host.services)),
            scheduler: Scheduler::new(Arc::clone(&access)),
            host,
            access,
            config,
            cancel,
        }
    }

    /// Adopt the profiles persisted as managed by a previous run. Returns
    /// how many were adopted.
    ///
    /// The installed document is read back so the adopted entry describes
    /// the live profile. A name with nothing installed is adopted as a
    /// tombstone.
    pub fn seed_from_state(&self) -> Result<usize, CoreError> {
        let mut adopted = 0;
        for class in ProfileClass::iter() {
            let Some(name) = self.host.state.load_managed(&class.to_string())? else {
                continue;
            };
            let mut profile = match self.host.bridge.get(&name)? {
                Some(document) => ManagedProfile::new(
                    name.as_str(),
                    class,
                    document,
                    RuntimeAttributes::default(),
                ),
                None => ManagedProfile::tombstone(&name, class),
            };
            match self.host.interfaces.read_mtu(&name) {
                Ok(mtu) => profile.attributes.mtu = mtu,
                Err(e) => debug!(profile = %name, error = %e, "interface MTU unreadable"),
            }
            info!(
                profile = %name,
                %class,
                installed = !profile.is_tombstone(),
                "resuming management"
            );
            self.scheduler.adopt(profile);
            adopted += 1;
        }
        Ok(adopted)
    }

    /// Queue a create or update for the update's class. When the class
    /// already manages a profile under another name, the update becomes a
    /// rename of it.
    pub fn schedule_upsert(&self, update: ManagedProfile) {
        self.scheduler.schedule_for_class(update);
    }

    pub fn schedule_delete(&self, name: &str, class: ProfileClass) {
        self.scheduler.schedule(ManagedProfile::tombstone(name, class));
    }

    /// Run one reconciliation pass.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        match self.refresh_connected() {
            Ok(names) => report.connected = names,
            Err(e) => {
                // Without a current view of connections nothing is safe to touch.
                warn!(error = %e, "could not enumerate active connections; skipping tick");
                report.failed.push(TickFailure {
                    name: String::new(),
                    error: e.to_string(),
                });
                report.pending = self.scheduler.pending_count();
                return report;
            }
        }

        let released = self
            .scheduler
            .release(&report.connected, self.config.allow_updates_while_connected);
        debug!(released = released.len(), connected = ?report.connected, "tick");

        let applier = Applier::new(&self.host, &self.access, &self.config, &self.cancel);
        for update in released {
            if self.cancel.is_cancelled() {
                break;
            }
            match applier.apply(&update) {
                Ok(applied) => {
                    if applied.restart_required {
                        self.restart.request();
                    }
                    self.scheduler.mark_deployed(&update);
                    report.applied.push(applied);
                }
                Err(CoreError::Cancelled) => break,
                Err(e) if e.is_transient() => {
                    info!(profile = %update.name, error = %e, "update deferred");
                    report.deferred.push(update.name);
                }
                Err(e) => {
                    warn!(profile = %update.name, error = %e, "update failed");
                    report.failed.push(TickFailure {
                        name: update.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        if self.restart.is_requested() {
            report.restart_issued = self.try_restart();
        }
        report.pending = self.scheduler.pending_count();
        report
    }

    fn try_restart(&self) -> bool {
        let active = match self.refresh_connected() {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "restart deferred: cannot enumerate connections");
                return false;
            }
        };
        let device = self.scheduler.managed_for_class(ProfileClass::Machine);
        self.restart.maybe_restart(
            &self.config.restart_service,
            &active,
            device.as_ref().map(|d| d.name.as_str()),
        )
    }

    /// Re-enumerate active connections into the connected cache.
    fn refresh_connected(&self) -> Result<Vec<String>, CoreError> {
        let _phonebook = self.access.phonebook();
        let names: Vec<String> = self
            .host
            .connections
            .list_active()?
            .into_iter()
            .filter(|c| c.status != ConnectionStatus::Disconnected)
            .map(|c| c.name)
            .collect();
        self.access.connected().names.clone_from(&names);
        Ok(names)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn managed_names(&self) -> Vec<String> {
        self.scheduler.managed_names()
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.pending_count()
    }

    /// Connected names as of the last tick.
    pub fn connected_names(&self) -> Vec<String> {
        self.access.connected().names.clone()
    }

    /// MTU-only change to a managed profile, applied straight to its
    /// interface with a read-back. Runs while the profile is connected and
    /// queues nothing. Returns false when `name` is not managed.
    pub fn update_mtu(&self, name: &str, mtu: u32) -> Result<bool, CoreError> {
        if !self.scheduler.update_mtu(name, mtu) {
            debug!(profile = %name, mtu, "MTU change for an unmanaged profile ignored");
            return Ok(false);
        }
        if let Some(change) = sync_mtu(self.host.interfaces.as_ref(), name, mtu)? {
            info!(profile = %name, %change, "MTU applied");
        }
        Ok(true)
    }

    pub fn restart(&self) -> &RestartCoordinator {
        &self.restart
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("managed", &self.managed_names())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

// ── Tick driver ─────────────────────────────────────────────────────

fn jittered(config: &EngineConfig) -> Duration {
    let jitter = if config.tick_jitter_secs == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=config.tick_jitter_secs)
    };
    config.tick_interval() + Duration::from_secs(jitter)
}

/// Tick until the engine's cancellation token fires. Triggers queued while
/// a tick runs collapse into one eager tick.
pub async fn run(engine: Arc<Engine>, mut triggers: mpsc::Receiver<TickTrigger>) {
    let cancel = engine.cancel_token().clone();
    let mut triggers_open = true;
    info!(interval_secs = engine.config.tick_interval_secs, "engine started");

    loop {
        let delay = jittered(&engine.config);
        let reason = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            trigger = triggers.recv(), if triggers_open => match trigger {
                Some(trigger) => {
                    while triggers.try_recv().is_ok() {}
                    trigger.to_string()
                }
                None => {
                    debug!("trigger channel closed; periodic ticks only");
                    triggers_open = false;
                    continue;
                }
            },
            () = tokio::time::sleep(delay) => "periodic".to_owned(),
        };

        let worker = Arc::clone(&engine);
        match tokio::task::spawn_blocking(move || worker.tick()).await {
            Ok(report) => debug!(
                reason = %reason,
                applied = report.applied.len(),
                deferred = report.deferred.len(),
                failed = report.failed.len(),
                pending = report.pending,
                "tick complete"
            ),
            Err(e) => warn!(reason = %reason, error = %e, "tick task failed"),
        }
    }
    info!("engine stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::phonebook::materialize;
    use pretty_assertions::assert_eq;
    use tunnelward_api::MemoryHost;

    const DOC: &str = "<VPNProfile><AlwaysOn>true</AlwaysOn>\
        <NativeProfile><Servers>vpn.contoso.com</Servers></NativeProfile></VPNProfile>";

    fn engine() -> (Arc<MemoryHost>, Engine) {
        let memory = Arc::new(MemoryHost::new().with_materializer(materialize));
        let engine = Engine::new(
            Host::from_shared(memory.clone()),
            EngineConfig::immediate(),
            CancellationToken::new(),
        );
        (memory, engine)
    }

    fn user(name: &str) -> ManagedProfile {
        ManagedProfile::new(name, ProfileClass::User, DOC, RuntimeAttributes::default())
    }

    #[test]
    fn tick_deploys_and_empties_the_queue() {
        let (memory, engine) = engine();
        engine.schedule_upsert(user("Corp"));
        let report = engine.tick();
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.pending, 0);
        assert_eq!(engine.managed_names(), vec!["Corp"]);
        assert!(memory.snapshot().documents.contains_key("Corp"));
    }

    #[test]
    fn seeded_profile_is_renamed_when_name_changes() {
        let (memory, engine) = engine();
        memory.install("Corp Old", DOC);
        memory.edit(|s| {
            s.managed.insert("user".into(), "Corp Old".into());
        });
        assert_eq!(engine.seed_from_state().unwrap(), 1);

        engine.schedule_upsert(user("Corp"));
        engine.tick();
        let snapshot = memory.snapshot();
        assert!(!snapshot.documents.contains_key("Corp Old"));
        assert!(snapshot.documents.contains_key("Corp"));
        assert_eq!(snapshot.managed.get("user").map(String::as_str), Some("Corp"));
        assert_eq!(engine.managed_names(), vec!["Corp"]);
    }

    #[test]
    fn connected_profiles_are_held_back() {
        let (memory, engine) = engine();
        memory.install("Corp", "<VPNProfile/>");
        memory.connect("Corp");
        engine.schedule_upsert(user("Corp"));
        engine.schedule_upsert(ManagedProfile::new(
            "Lab",
            ProfileClass::UserBackup,
            DOC,
            RuntimeAttributes::default(),
        ));

        let report = engine.tick();
        assert_eq!(report.connected, vec!["Corp"]);
        assert_eq!(engine.connected_names(), vec!["Corp"]);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.pending, 1);
    }

    #[test]
    fn busy_profile_is_deferred_without_blocking_others() {
        let memory = Arc::new(MemoryHost::new().with_materializer(materialize));
        let config = EngineConfig {
            delete_timeout_secs: 0,
            ..EngineConfig::immediate()
        };
        let engine = Engine::new(
            Host::from_shared(memory.clone()),
            config,
            CancellationToken::new(),
        );
        memory.install("Alpha", "<VPNProfile/>");
        memory.script_in_use("Alpha", 100);
        engine.schedule_upsert(user("Alpha"));
        engine.schedule_upsert(ManagedProfile::new(
            "Beta",
            ProfileClass::UserBackup,
            DOC,
            RuntimeAttributes::default(),
        ));

        let report = engine.tick();
        assert_eq!(report.deferred, vec!["Alpha"]);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.applied[0].name, "Beta");
        assert_eq!(engine.pending_count(), 1);
    }

    #[test]
    fn mtu_update_applies_without_queueing() {
        let (memory, engine) = engine();
        engine.schedule_upsert(user("Corp"));
        engine.tick();

        assert!(engine.update_mtu("Corp", 1350).unwrap());
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(memory.snapshot().interfaces.get("Corp"), Some(&1350));
        assert!(!engine.update_mtu("Unmanaged", 1350).unwrap());
    }

    #[test]
    fn mtu_update_reaches_a_connected_profile() {
        let (memory, engine) = engine();
        engine.schedule_upsert(user("Corp"));
        engine.tick();
        memory.connect("Corp");
        engine.tick();

        assert!(engine.update_mtu("Corp", 1380).unwrap());
        assert_eq!(memory.snapshot().interfaces.get("Corp"), Some(&1380));
    }

    #[test]
    fn seeded_profile_takes_mtu_changes() {
        let (memory, engine) = engine();
        memory.install("Corp", DOC);
        memory.edit(|s| {
            s.managed.insert("user".into(), "Corp".into());
        });
        engine.seed_from_state().unwrap();

        assert!(engine.update_mtu("Corp", 1320).unwrap());
        assert_eq!(memory.snapshot().interfaces.get("Corp"), Some(&1320));
        let report = engine.tick();
        assert!(report.applied.is_empty());
    }

    #[tokio::test]
    async fn trigger_runs_an_eager_tick() {
        let (_memory, engine) = engine();
        let engine = Arc::new(engine);
        engine.schedule_upsert(user("Corp"));

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run(Arc::clone(&engine), rx));
        tx.send(TickTrigger::PolicyRefresh).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.pending_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        engine.cancel_token().cancel();
        task.await.unwrap();
        assert_eq!(engine.managed_names(), vec!["Corp"]);
    }
}
