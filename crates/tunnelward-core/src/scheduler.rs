// ── Pending-update scheduler ──
//
// Queues create/rename/delete requests by profile name and decides which
// of them may be applied this tick. Renames never stack hops: an update
// for a name that already has an undeployed rename queued inherits that
// rename's source, and a queued delete of a rename target that was never
// created is discarded in favor of its own source.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::access::Access;
use crate::model::{ManagedProfile, ProfileClass};

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Updates waiting to be applied, keyed by lowercase profile name.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: IndexMap<String, ManagedProfile>,
}

impl PendingQueue {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ManagedProfile> {
        self.entries.get(&key(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedProfile> {
        self.entries.values()
    }

    /// Insert or replace the entry for `update.name`.
    pub fn schedule(&mut self, mut update: ManagedProfile) {
        let name = key(&update.name);

        if let Some(existing) = self.entries.get(&name) {
            if !existing.deployed && existing.old_profile_name.is_some() {
                update.old_profile_name.clone_from(&existing.old_profile_name);
            }
        }

        if let Some(old) = update.old_profile_name.clone() {
            let old_key = key(&old);
            let stale = old_key != name
                && self
                    .entries
                    .get(&old_key)
                    .is_some_and(|e| !e.deployed && e.is_tombstone());
            if stale {
                let discarded = self.entries.shift_remove(&old_key);
                let inherited = discarded.and_then(|d| d.old_profile_name);
                debug!(
                    profile = %update.name,
                    discarded = %old,
                    inherited = ?inherited,
                    "collapsed stale delete into rename"
                );
                if inherited.is_some() {
                    update.old_profile_name = inherited;
                }
            }
        }

        if update
            .old_profile_name
            .as_deref()
            .is_some_and(|old| key(old) == name)
        {
            update.old_profile_name = None;
        }
        self.entries.insert(name, update);
    }

    /// Entries eligible this tick, tombstones first, then by name.
    ///
    /// With nothing connected, or with updates while connected allowed,
    /// everything is eligible. Otherwise an entry is held back while its
    /// name or its rename source is connected.
    pub fn release(
        &self,
        connected: &[String],
        allow_while_connected: bool,
    ) -> Vec<ManagedProfile> {
        let is_connected = |name: &str| connected.iter().any(|c| c.eq_ignore_ascii_case(name));
        let mut out: Vec<ManagedProfile> = self
            .entries
            .values()
            .filter(|e| {
                connected.is_empty()
                    || allow_while_connected
                    || (!is_connected(&e.name)
                        && !e.old_profile_name.as_deref().is_some_and(is_connected))
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.is_tombstone()
                .cmp(&a.is_tombstone())
                .then_with(|| key(&a.name).cmp(&key(&b.name)))
        });
        out
    }

    /// Drop queued creates of `class` under any name other than `name`.
    /// Returns the rename source an undeployed one carried.
    fn supersede(&mut self, class: ProfileClass, name: &str) -> Option<String> {
        let name = key(name);
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(k, e)| **k != name && e.class == class && !e.is_tombstone())
            .map(|(k, _)| k.clone())
            .collect();
        let mut inherited = None;
        for k in stale {
            if let Some(entry) = self.entries.shift_remove(&k) {
                debug!(profile = %entry.name, %class, "superseded by a newer name");
                if !entry.deployed && inherited.is_none() {
                    inherited = entry.old_profile_name;
                }
            }
        }
        inherited
    }

    /// Drop the entry for `update.name` if it is still the one that was
    /// applied. A newer request scheduled meanwhile stays queued.
    fn retire(&mut self, update: &ManagedProfile) -> bool {
        let name = key(&update.name);
        if self.entries.get(&name) == Some(update) {
            self.entries.shift_remove(&name);
            true
        } else {
            false
        }
    }
}

/// Profiles currently installed under management, keyed by lowercase name.
#[derive(Debug, Default)]
pub struct ManagedSet {
    entries: IndexMap<String, ManagedProfile>,
}

impl ManagedSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ManagedProfile> {
        self.entries.get(&key(name))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.values().map(|e| e.name.clone()).collect()
    }

    /// The managed profile of `class`, if any.
    pub fn for_class(&self, class: ProfileClass) -> Option<&ManagedProfile> {
        self.entries.values().find(|e| e.class == class)
    }

    fn insert(&mut self, profile: ManagedProfile) {
        self.entries.insert(key(&profile.name), profile);
    }

    fn remove(&mut self, name: &str) -> Option<ManagedProfile> {
        self.entries.shift_remove(&key(name))
    }
}

/// Scheduler operations over the shared queue and managed set.
#[derive(Debug, Clone)]
pub struct Scheduler {
    access: Arc<Access>,
}

impl Scheduler {
    pub fn new(access: Arc<Access>) -> Self {
        Self { access }
    }

    pub fn schedule(&self, update: ManagedProfile) {
        debug!(
            profile = %update.name,
            class = %update.class,
            tombstone = update.is_tombstone(),
            old = ?update.old_profile_name,
            "scheduling update"
        );
        self.access.pending().schedule(update);
    }

    /// Queue `update` as the one profile of its class. Creates queued
    /// under another name are dropped, and a class already managed under
    /// another name is renamed.
    pub fn schedule_for_class(&self, mut update: ManagedProfile) {
        let managed = self.access.managed();
        let mut pending = self.access.pending();
        let inherited = pending.supersede(update.class, &update.name);
        if update.old_profile_name.is_none() {
            let current = managed
                .for_class(update.class)
                .map(|m| m.name.clone())
                .filter(|n| !n.eq_ignore_ascii_case(&update.name));
            update.old_profile_name = current.or(inherited);
        }
        debug!(
            profile = %update.name,
            class = %update.class,
            old = ?update.old_profile_name,
            "scheduling class update"
        );
        pending.schedule(update);
    }

    pub fn release(
        &self,
        connected: &[String],
        allow_while_connected: bool,
    ) -> Vec<ManagedProfile> {
        self.access
            .pending()
            .release(connected, allow_while_connected)
    }

    pub fn managed_names(&self) -> Vec<String> {
        self.access.managed().names()
    }

    pub fn managed_for_class(&self, class: ProfileClass) -> Option<ManagedProfile> {
        self.access.managed().for_class(class).cloned()
    }

    pub fn managed_for_name(&self, name: &str) -> Option<ManagedProfile> {
        self.access.managed().get(name).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.access.pending().len()
    }

    /// Record a profile found installed at startup as managed.
    pub fn adopt(&self, mut profile: ManagedProfile) {
        profile.deployed = true;
        profile.old_profile_name = None;
        self.access.managed().insert(profile);
    }

    /// Update the MTU of an already-managed profile in place, and of a
    /// queued update for the same name so applying it keeps the value.
    /// Returns false when `name` is not managed.
    pub fn update_mtu(&self, name: &str, mtu: u32) -> bool {
        let mut managed = self.access.managed();
        let Some(entry) = managed.entries.get_mut(&key(name)) else {
            return false;
        };
        entry.attributes.mtu = Some(mtu);
        if let Some(queued) = self.access.pending().entries.get_mut(&key(name)) {
            queued.attributes.mtu = Some(mtu);
        }
        true
    }

    /// Fold an applied update into the managed set and retire it from the
    /// queue.
    pub fn mark_deployed(&self, update: &ManagedProfile) {
        let mut managed = self.access.managed();
        if let Some(old) = &update.old_profile_name {
            managed.remove(old);
        }
        if update.is_tombstone() {
            managed.remove(&update.name);
        } else {
            let mut deployed = update.clone();
            deployed.deployed = true;
            deployed.old_profile_name = None;
            managed.insert(deployed);
        }
        let retired = self.access.pending().retire(update);
        if !retired {
            debug!(profile = %update.name, "newer update queued; keeping it");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::RuntimeAttributes;
    use pretty_assertions::assert_eq;

    const DOC: &str = "<VPNProfile><AlwaysOn>true</AlwaysOn></VPNProfile>";

    fn upsert(name: &str) -> ManagedProfile {
        ManagedProfile::new(name, ProfileClass::User, DOC, RuntimeAttributes::default())
    }

    fn delete(name: &str) -> ManagedProfile {
        ManagedProfile::tombstone(name, ProfileClass::User)
    }

    fn names(updates: &[ManagedProfile]) -> Vec<&str> {
        updates.iter().map(|u| u.name.as_str()).collect()
    }

    #[test]
    fn rename_collapses_stale_delete() {
        let mut queue = PendingQueue::default();
        queue.schedule(delete("A"));
        queue.schedule(upsert("B").renamed_from("A"));
        queue.schedule(upsert("B").renamed_from("A"));

        assert_eq!(queue.len(), 1);
        let b = queue.get("B").unwrap();
        assert_eq!(b.old_profile_name.as_deref(), Some("A"));
    }

    #[test]
    fn rename_inherits_original_source() {
        let mut queue = PendingQueue::default();
        queue.schedule(upsert("B").renamed_from("A"));
        queue.schedule(upsert("B").renamed_from("X"));
        assert_eq!(
            queue.get("B").unwrap().old_profile_name.as_deref(),
            Some("A")
        );
    }

    #[test]
    fn never_created_rename_target_collapses_to_its_source() {
        let mut queue = PendingQueue::default();
        // A → B queued, then B deleted before it was ever created.
        queue.schedule(upsert("B").renamed_from("A"));
        queue.schedule(delete("B"));
        assert_eq!(
            queue.get("B").unwrap().old_profile_name.as_deref(),
            Some("A")
        );

        // B → C: the queued delete of B is dropped, C depends on A.
        queue.schedule(upsert("C").renamed_from("B"));
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.get("C").unwrap().old_profile_name.as_deref(),
            Some("A")
        );
    }

    #[test]
    fn release_orders_tombstones_first() {
        let mut queue = PendingQueue::default();
        queue.schedule(upsert("Zeta"));
        queue.schedule(delete("Old"));
        queue.schedule(upsert("Alpha"));
        assert_eq!(names(&queue.release(&[], false)), vec!["Old", "Alpha", "Zeta"]);
    }

    #[test]
    fn release_respects_connections() {
        let mut queue = PendingQueue::default();
        queue.schedule(upsert("Corp"));
        queue.schedule(upsert("Lab").renamed_from("Lab Old"));
        queue.schedule(upsert("Other"));

        let connected = vec!["corp".to_owned(), "Lab Old".to_owned()];
        assert_eq!(names(&queue.release(&connected, false)), vec!["Other"]);
        assert_eq!(queue.release(&connected, true).len(), 3);
        assert_eq!(queue.release(&[], false).len(), 3);
    }

    #[test]
    fn deploy_folds_into_managed_set() {
        let scheduler = Scheduler::new(Arc::new(Access::new()));
        scheduler.adopt(upsert("A"));
        let b = upsert("B").renamed_from("A");
        scheduler.schedule(b.clone());

        let released = scheduler.release(&[], false);
        scheduler.mark_deployed(&released[0]);
        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(scheduler.managed_names(), vec!["B"]);

        assert!(scheduler.update_mtu("b", 1350));
        assert_eq!(
            scheduler
                .managed_for_class(ProfileClass::User)
                .unwrap()
                .attributes
                .mtu,
            Some(1350)
        );
        assert!(!scheduler.update_mtu("missing", 1350));

        scheduler.schedule(delete("B"));
        let released = scheduler.release(&[], false);
        scheduler.mark_deployed(&released[0]);
        assert!(scheduler.managed_names().is_empty());
    }

    #[test]
    fn mtu_update_carries_into_queued_update() {
        let scheduler = Scheduler::new(Arc::new(Access::new()));
        scheduler.adopt(upsert("Corp"));
        scheduler.schedule(upsert("corp"));
        assert!(scheduler.update_mtu("Corp", 1400));

        let released = scheduler.release(&[], false);
        assert_eq!(released[0].attributes.mtu, Some(1400));
        let managed = scheduler.managed_for_name("CORP").unwrap();
        assert!(managed.deployed && !managed.is_tombstone());
    }

    #[test]
    fn newer_update_survives_deploy_of_older() {
        let scheduler = Scheduler::new(Arc::new(Access::new()));
        scheduler.schedule(upsert("Corp"));
        let released = scheduler.release(&[], false);

        let mut newer = upsert("Corp");
        newer.attributes.mtu = Some(1300);
        scheduler.schedule(newer);
        scheduler.mark_deployed(&released[0]);
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn newer_class_name_supersedes_queued_create() {
        let scheduler = Scheduler::new(Arc::new(Access::new()));
        scheduler.adopt(upsert("A"));
        scheduler.schedule_for_class(upsert("B"));
        scheduler.schedule_for_class(upsert("C"));

        let released = scheduler.release(&[], false);
        assert_eq!(names(&released), vec!["C"]);
        assert_eq!(released[0].old_profile_name.as_deref(), Some("A"));
    }

    #[test]
    fn supersede_inherits_pending_rename_source() {
        let scheduler = Scheduler::new(Arc::new(Access::new()));
        scheduler.schedule(upsert("B").renamed_from("A"));
        scheduler.schedule_for_class(upsert("C"));
        let released = scheduler.release(&[], false);
        assert_eq!(names(&released), vec!["C"]);
        assert_eq!(released[0].old_profile_name.as_deref(), Some("A"));
    }

    #[test]
    fn concurrent_schedules_leave_one_entry() {
        let scheduler = Scheduler::new(Arc::new(Access::new()));
        scheduler.schedule(delete("A"));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let scheduler = scheduler.clone();
                std::thread::spawn(move || {
                    let mut update = upsert("B").renamed_from("A");
                    update.attributes.mtu = Some(1300 + i);
                    scheduler.schedule(update);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(scheduler.pending_count(), 1);
        let released = scheduler.release(&[], false);
        assert_eq!(released[0].name, "B");
        assert_eq!(released[0].old_profile_name.as_deref(), Some("A"));
    }
}
