// ── Shared-state access layer ──
//
// Four exclusive resources, always acquired in one order:
//
//   phonebook  →  managed  →  pending  →  connected
//
// The phonebook guard serializes every call that touches the single-writer
// phonebook file (entry get/set/delete, enumeration, dial/hangup). The
// other three guard in-memory state. A thread records which levels it
// holds; taking a level at or below one already held is an ordering bug
// and trips a debug assertion instead of deadlocking later.

use std::cell::Cell;
use std::ops::{Deref, DerefMut};

use parking_lot::{Mutex, MutexGuard};

use crate::scheduler::{ManagedSet, PendingQueue};

/// Lock levels, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
pub enum Resource {
    Phonebook,
    Managed,
    Pending,
    Connected,
}

impl Resource {
    #[allow(clippy::as_conversions)]
    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

thread_local! {
    static HELD: Cell<u8> = const { Cell::new(0) };
}

/// Names of the connections the engine last saw active.
#[derive(Debug, Default)]
pub struct ConnectedCache {
    pub names: Vec<String>,
}

impl ConnectedCache {
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

/// Marker for the phonebook resource. Holding the guard is the point.
#[derive(Debug, Default)]
pub struct PhonebookResource;

/// Guard that releases its lock level on drop.
pub struct Guard<'a, T> {
    inner: MutexGuard<'a, T>,
    resource: Resource,
}

impl<T> Deref for Guard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for Guard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for Guard<'_, T> {
    fn drop(&mut self) {
        HELD.with(|held| held.set(held.get() & !self.resource.bit()));
    }
}

#[derive(Debug, Default)]
pub struct Access {
    phonebook: Mutex<PhonebookResource>,
    managed: Mutex<ManagedSet>,
    pending: Mutex<PendingQueue>,
    connected: Mutex<ConnectedCache>,
}

impl Access {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire<'a, T>(&'a self, mutex: &'a Mutex<T>, resource: Resource) -> Guard<'a, T> {
        HELD.with(|held| {
            let current = held.get();
            // Every level at or after `resource` must be free.
            let blocked = current & !(resource.bit() - 1);
            debug_assert!(
                blocked == 0,
                "lock order violation: acquiring {resource} while holding {current:#06b}"
            );
            held.set(current | resource.bit());
        });
        Guard {
            inner: mutex.lock(),
            resource,
        }
    }

    pub fn phonebook(&self) -> Guard<'_, PhonebookResource> {
        self.acquire(&self.phonebook, Resource::Phonebook)
    }

    pub fn managed(&self) -> Guard<'_, ManagedSet> {
        self.acquire(&self.managed, Resource::Managed)
    }

    pub fn pending(&self) -> Guard<'_, PendingQueue> {
        self.acquire(&self.pending, Resource::Pending)
    }

    pub fn connected(&self) -> Guard<'_, ConnectedCache> {
        self.acquire(&self.connected, Resource::Connected)
    }

    /// Run `f` with the phonebook guard held.
    pub fn with_phonebook<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.phonebook();
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_acquisition_is_allowed() {
        let access = Access::new();
        let _pb = access.phonebook();
        let _m = access.managed();
        let _p = access.pending();
        let _c = access.connected();
    }

    #[test]
    fn levels_may_be_skipped_and_reacquired() {
        let access = Access::new();
        {
            let _m = access.managed();
            let _c = access.connected();
        }
        let _pb = access.phonebook();
        assert!(access.managed().is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "lock order violation")]
    fn out_of_order_acquisition_panics() {
        let access = Access::new();
        let _p = access.pending();
        let _m = access.managed();
    }
}
