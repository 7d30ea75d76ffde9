// ── In-memory host ──
//
// A complete host held in memory: bridge documents, both phonebooks,
// active connections, interface MTUs, side artifacts, route sources and the
// managed-name state. Every trait call is recorded so callers can assert on
// exactly which OS operations a reconciliation pass issued.
//
// The host state is plain serde data, so the CLI simulator can load a JSON
// snapshot, run a pass, and print the resulting snapshot.

use std::net::IpAddr;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::artifacts::{ArtifactStore, NetworkBinding, TrackedResource};
use crate::bridge::ProfileBridge;
use crate::connection::{
    ActiveConnection, ConnectionHandle, ConnectionManager, ConnectionStatus, EntryProperties,
    ProxySettings,
};
use crate::error::Error;
use crate::interface::InterfaceControl;
use crate::phonebook::{PhonebookScope, PhonebookSection, PhonebookStore};
use crate::routes::RouteSources;
use crate::service::ServiceControl;
use crate::state::StateStore;

/// Derives the phonebook scope and section the OS writes when a document
/// is installed through the bridge.
pub type Materializer = dyn Fn(&str) -> (PhonebookScope, PhonebookSection) + Send + Sync;

/// One connection entry: its phonebook section plus OS-only properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryEntry {
    pub section: PhonebookSection,
    pub properties: EntryProperties,
    pub proxy: ProxySettings,
}

/// Full host state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySnapshot {
    /// Bridge documents by profile name.
    pub documents: IndexMap<String, String>,
    pub guids: IndexMap<String, Uuid>,
    pub all_users: IndexMap<String, MemoryEntry>,
    pub current_user: IndexMap<String, MemoryEntry>,
    pub active: Vec<ActiveConnection>,
    /// MTU by interface name.
    pub interfaces: IndexMap<String, u32>,
    pub tracked: Vec<TrackedResource>,
    pub bindings: Vec<NetworkBinding>,
    pub auto_trigger_disabled: Vec<String>,
    /// `None` makes the Office 365 fetch fail.
    pub office365: Option<Vec<String>>,
    /// Hostnames missing here fail to resolve.
    pub dns: IndexMap<String, Vec<IpAddr>>,
    /// Managed profile name by tunnel class.
    pub managed: IndexMap<String, String>,
    pub restarts: Vec<String>,
    next_handle: u64,
}

impl MemorySnapshot {
    fn scope(&self, scope: PhonebookScope) -> &IndexMap<String, MemoryEntry> {
        match scope {
            PhonebookScope::AllUsers => &self.all_users,
            PhonebookScope::CurrentUser => &self.current_user,
        }
    }

    fn scope_mut(&mut self, scope: PhonebookScope) -> &mut IndexMap<String, MemoryEntry> {
        match scope {
            PhonebookScope::AllUsers => &mut self.all_users,
            PhonebookScope::CurrentUser => &mut self.current_user,
        }
    }

    fn entry(&self, scope: PhonebookScope, name: &str) -> Result<&MemoryEntry, Error> {
        self.scope(scope)
            .get(name)
            .ok_or_else(|| Error::not_found("connection entry", name))
    }

    fn entry_mut(&mut self, scope: PhonebookScope, name: &str) -> Result<&mut MemoryEntry, Error> {
        self.scope_mut(scope)
            .get_mut(name)
            .ok_or_else(|| Error::not_found("connection entry", name))
    }
}

/// A recorded host call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum HostCall {
    // ── Bridge ──
    Create { name: String },
    Get { name: String },
    Guid { name: String },
    // ── Connections ──
    ListEntries,
    GetEntry { name: String },
    SetEntry { name: String },
    DeleteEntry { name: String },
    GetProxy { name: String },
    SetProxy { name: String },
    ListActive,
    Dial { name: String },
    Hangup { handle: u64 },
    Status { handle: u64 },
    // ── Phonebook ──
    ListProfiles,
    ReadSection { name: String },
    WriteValue { name: String, key: String },
    // ── Interfaces ──
    ReadMtu { interface: String },
    ApplyMtu { interface: String, mtu: u32 },
    // ── Artifacts ──
    TrackedResources,
    SetTrackedCount { key: String, count: u32 },
    RemoveTracked { key: String },
    NetworkBindings,
    RemoveNetworkBinding { id: String },
    AutoTriggerDisabled,
    SetAutoTriggerDisabled,
    // ── Services / routes / state ──
    Restart { service: String },
    Office365,
    Resolve { host: String },
    LoadManaged { class: String },
    SaveManaged { class: String, name: String },
    ClearManaged { class: String },
}

impl HostCall {
    /// Whether the call changes host state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Create { .. }
                | Self::SetEntry { .. }
                | Self::DeleteEntry { .. }
                | Self::SetProxy { .. }
                | Self::Dial { .. }
                | Self::Hangup { .. }
                | Self::WriteValue { .. }
                | Self::ApplyMtu { .. }
                | Self::SetTrackedCount { .. }
                | Self::RemoveTracked { .. }
                | Self::RemoveNetworkBinding { .. }
                | Self::SetAutoTriggerDisabled
                | Self::Restart { .. }
                | Self::SaveManaged { .. }
                | Self::ClearManaged { .. }
        )
    }
}

/// In-memory implementation of every host trait.
pub struct MemoryHost {
    state: Mutex<MemorySnapshot>,
    calls: Mutex<Vec<HostCall>>,
    in_use: Mutex<IndexMap<String, u32>>,
    /// Names whose hangups leave the connection disconnecting.
    lingering: Mutex<Vec<String>>,
    materializer: Option<Arc<Materializer>>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::from_snapshot(MemorySnapshot::default())
    }

    pub fn from_snapshot(snapshot: MemorySnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
            calls: Mutex::new(Vec::new()),
            in_use: Mutex::new(IndexMap::new()),
            lingering: Mutex::new(Vec::new()),
            materializer: None,
        }
    }

    pub fn with_materializer(
        mut self,
        materializer: impl Fn(&str) -> (PhonebookScope, PhonebookSection) + Send + Sync + 'static,
    ) -> Self {
        self.materializer = Some(Arc::new(materializer));
        self
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        self.state.lock().clone()
    }

    /// Mutate host state directly without recording a call.
    pub fn edit(&self, f: impl FnOnce(&mut MemorySnapshot)) {
        f(&mut self.state.lock());
    }

    /// Install a profile as if the OS already had it. Not recorded.
    pub fn install(&self, name: &str, document: &str) {
        let mut state = self.state.lock();
        self.materialize(&mut state, name, document);
    }

    /// Bring up an active connection for `name`. Not recorded.
    pub fn connect(&self, name: &str) -> ConnectionHandle {
        let mut state = self.state.lock();
        Self::push_active(&mut state, name)
    }

    /// Make the next `times` deletes of `name` fail as in-use.
    pub fn script_in_use(&self, name: &str, times: u32) {
        self.in_use.lock().insert(name.to_owned(), times);
    }

    /// Make hangups of `name` leave its connection disconnecting instead
    /// of dropping it.
    pub fn script_lingering(&self, name: &str) {
        self.lingering.lock().push(name.to_owned());
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    pub fn mutations(&self) -> Vec<HostCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: HostCall) {
        debug!(?call, "host call");
        self.calls.lock().push(call);
    }

    fn materialize(&self, state: &mut MemorySnapshot, name: &str, document: &str) {
        let (scope, section) = match &self.materializer {
            Some(m) => m(document),
            None => (PhonebookScope::CurrentUser, PhonebookSection::new()),
        };
        state.documents.insert(name.to_owned(), document.to_owned());
        state
            .guids
            .entry(name.to_owned())
            .or_insert_with(Uuid::new_v4);
        state.scope_mut(scope).insert(
            name.to_owned(),
            MemoryEntry {
                section,
                ..MemoryEntry::default()
            },
        );
    }

    fn push_active(state: &mut MemorySnapshot, name: &str) -> ConnectionHandle {
        state.next_handle += 1;
        let handle = ConnectionHandle(state.next_handle);
        state.active.push(ActiveConnection {
            handle,
            name: name.to_owned(),
            status: ConnectionStatus::Connected,
        });
        handle
    }
}

impl ProfileBridge for MemoryHost {
    fn create(&self, name: &str, document: &str) -> Result<(), Error> {
        self.record(HostCall::Create {
            name: name.to_owned(),
        });
        let mut state = self.state.lock();
        if state.documents.contains_key(name) {
            return Err(Error::Rejected {
                message: format!("profile '{name}' already exists"),
            });
        }
        self.materialize(&mut state, name, document);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<String>, Error> {
        self.record(HostCall::Get {
            name: name.to_owned(),
        });
        Ok(self.state.lock().documents.get(name).cloned())
    }

    fn guid(&self, name: &str) -> Result<Option<Uuid>, Error> {
        self.record(HostCall::Guid {
            name: name.to_owned(),
        });
        Ok(self.state.lock().guids.get(name).copied())
    }
}

impl ConnectionManager for MemoryHost {
    fn list_entries(&self, scope: PhonebookScope) -> Result<Vec<String>, Error> {
        self.record(HostCall::ListEntries);
        Ok(self.state.lock().scope(scope).keys().cloned().collect())
    }

    fn get_entry(&self, scope: PhonebookScope, name: &str) -> Result<EntryProperties, Error> {
        self.record(HostCall::GetEntry {
            name: name.to_owned(),
        });
        Ok(self.state.lock().entry(scope, name)?.properties.clone())
    }

    fn set_entry(
        &self,
        scope: PhonebookScope,
        name: &str,
        properties: &EntryProperties,
    ) -> Result<(), Error> {
        self.record(HostCall::SetEntry {
            name: name.to_owned(),
        });
        self.state.lock().entry_mut(scope, name)?.properties = properties.clone();
        Ok(())
    }

    fn delete_entry(&self, scope: PhonebookScope, name: &str) -> Result<(), Error> {
        self.record(HostCall::DeleteEntry {
            name: name.to_owned(),
        });
        {
            let mut in_use = self.in_use.lock();
            if let Some(remaining) = in_use.get_mut(name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::InUse {
                        name: name.to_owned(),
                    });
                }
            }
        }
        let mut state = self.state.lock();
        if state.active.iter().any(|c| c.name == name) {
            return Err(Error::InUse {
                name: name.to_owned(),
            });
        }
        let had_entry = state.scope_mut(scope).shift_remove(name).is_some();
        let had_document = state.documents.shift_remove(name).is_some();
        state.guids.shift_remove(name);
        if had_entry || had_document {
            Ok(())
        } else {
            Err(Error::not_found("connection entry", name))
        }
    }

    fn get_proxy(&self, scope: PhonebookScope, name: &str) -> Result<ProxySettings, Error> {
        self.record(HostCall::GetProxy {
            name: name.to_owned(),
        });
        Ok(self.state.lock().entry(scope, name)?.proxy.clone())
    }

    fn set_proxy(
        &self,
        scope: PhonebookScope,
        name: &str,
        settings: &ProxySettings,
    ) -> Result<(), Error> {
        self.record(HostCall::SetProxy {
            name: name.to_owned(),
        });
        self.state.lock().entry_mut(scope, name)?.proxy = settings.clone();
        Ok(())
    }

    fn list_active(&self) -> Result<Vec<ActiveConnection>, Error> {
        self.record(HostCall::ListActive);
        Ok(self.state.lock().active.clone())
    }

    fn dial(&self, scope: PhonebookScope, name: &str) -> Result<ConnectionHandle, Error> {
        self.record(HostCall::Dial {
            name: name.to_owned(),
        });
        let mut state = self.state.lock();
        state.entry(scope, name)?;
        Ok(Self::push_active(&mut state, name))
    }

    fn hangup(&self, handle: ConnectionHandle) -> Result<(), Error> {
        self.record(HostCall::Hangup { handle: handle.0 });
        let lingering = self.lingering.lock();
        let mut state = self.state.lock();
        let lingers = state.active.iter().any(|c| {
            c.handle == handle && lingering.iter().any(|n| n.eq_ignore_ascii_case(&c.name))
        });
        if lingers {
            for c in state.active.iter_mut().filter(|c| c.handle == handle) {
                c.status = ConnectionStatus::Disconnecting;
            }
        } else {
            state.active.retain(|c| c.handle != handle);
        }
        Ok(())
    }

    fn status(&self, handle: ConnectionHandle) -> Result<ConnectionStatus, Error> {
        self.record(HostCall::Status { handle: handle.0 });
        Ok(self
            .state
            .lock()
            .active
            .iter()
            .find(|c| c.handle == handle)
            .map_or(ConnectionStatus::Disconnected, |c| c.status))
    }
}

impl PhonebookStore for MemoryHost {
    fn list_profiles(&self, scope: PhonebookScope) -> Result<Vec<String>, Error> {
        self.record(HostCall::ListProfiles);
        Ok(self.state.lock().scope(scope).keys().cloned().collect())
    }

    fn read_section(
        &self,
        scope: PhonebookScope,
        name: &str,
    ) -> Result<Option<PhonebookSection>, Error> {
        self.record(HostCall::ReadSection {
            name: name.to_owned(),
        });
        Ok(self
            .state
            .lock()
            .scope(scope)
            .get(name)
            .map(|e| e.section.clone()))
    }

    fn write_value(
        &self,
        scope: PhonebookScope,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        self.record(HostCall::WriteValue {
            name: name.to_owned(),
            key: key.to_owned(),
        });
        self.state
            .lock()
            .entry_mut(scope, name)?
            .section
            .set(key, value);
        Ok(())
    }
}

impl InterfaceControl for MemoryHost {
    fn read_mtu(&self, interface: &str) -> Result<Option<u32>, Error> {
        self.record(HostCall::ReadMtu {
            interface: interface.to_owned(),
        });
        Ok(self.state.lock().interfaces.get(interface).copied())
    }

    fn apply_mtu(&self, interface: &str, mtu: u32) -> Result<(), Error> {
        self.record(HostCall::ApplyMtu {
            interface: interface.to_owned(),
            mtu,
        });
        self.state
            .lock()
            .interfaces
            .insert(interface.to_owned(), mtu);
        Ok(())
    }
}

impl ArtifactStore for MemoryHost {
    fn tracked_resources(&self) -> Result<Vec<TrackedResource>, Error> {
        self.record(HostCall::TrackedResources);
        Ok(self.state.lock().tracked.clone())
    }

    fn set_tracked_count(&self, key: &str, count: u32) -> Result<(), Error> {
        self.record(HostCall::SetTrackedCount {
            key: key.to_owned(),
            count,
        });
        let mut state = self.state.lock();
        let resource = state
            .tracked
            .iter_mut()
            .find(|r| r.key == key)
            .ok_or_else(|| Error::not_found("tracked resource", key))?;
        resource.count = count;
        Ok(())
    }

    fn remove_tracked(&self, key: &str) -> Result<(), Error> {
        self.record(HostCall::RemoveTracked {
            key: key.to_owned(),
        });
        self.state.lock().tracked.retain(|r| r.key != key);
        Ok(())
    }

    fn network_bindings(&self) -> Result<Vec<NetworkBinding>, Error> {
        self.record(HostCall::NetworkBindings);
        Ok(self.state.lock().bindings.clone())
    }

    fn remove_network_binding(&self, id: &str) -> Result<(), Error> {
        self.record(HostCall::RemoveNetworkBinding { id: id.to_owned() });
        self.state.lock().bindings.retain(|b| b.id != id);
        Ok(())
    }

    fn auto_trigger_disabled(&self) -> Result<Vec<String>, Error> {
        self.record(HostCall::AutoTriggerDisabled);
        Ok(self.state.lock().auto_trigger_disabled.clone())
    }

    fn set_auto_trigger_disabled(&self, profiles: &[String]) -> Result<(), Error> {
        self.record(HostCall::SetAutoTriggerDisabled);
        self.state.lock().auto_trigger_disabled = profiles.to_vec();
        Ok(())
    }
}

impl ServiceControl for MemoryHost {
    fn restart(&self, service: &str) -> Result<(), Error> {
        self.record(HostCall::Restart {
            service: service.to_owned(),
        });
        self.state.lock().restarts.push(service.to_owned());
        Ok(())
    }
}

impl RouteSources for MemoryHost {
    fn office365_exclusions(&self) -> Result<Vec<String>, Error> {
        self.record(HostCall::Office365);
        self.state.lock().office365.clone().ok_or(Error::Fetch {
            source_name: "office365",
            message: "endpoint service unreachable".into(),
        })
    }

    fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, Error> {
        self.record(HostCall::Resolve {
            host: host.to_owned(),
        });
        self.state
            .lock()
            .dns
            .get(host)
            .cloned()
            .ok_or_else(|| Error::Fetch {
                source_name: "dns",
                message: format!("{host}: no records"),
            })
    }
}

impl StateStore for MemoryHost {
    fn load_managed(&self, class: &str) -> Result<Option<String>, Error> {
        self.record(HostCall::LoadManaged {
            class: class.to_owned(),
        });
        Ok(self.state.lock().managed.get(class).cloned())
    }

    fn save_managed(&self, class: &str, name: &str) -> Result<(), Error> {
        self.record(HostCall::SaveManaged {
            class: class.to_owned(),
            name: name.to_owned(),
        });
        self.state
            .lock()
            .managed
            .insert(class.to_owned(), name.to_owned());
        Ok(())
    }

    fn clear_managed(&self, class: &str) -> Result<(), Error> {
        self.record(HostCall::ClearManaged {
            class: class.to_owned(),
        });
        self.state.lock().managed.shift_remove(class);
        Ok(())
    }
}
