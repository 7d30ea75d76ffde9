use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::bridge::ProfileBridge;
use crate::connection::ConnectionManager;
use crate::interface::InterfaceControl;
use crate::phonebook::PhonebookStore;
use crate::routes::RouteSources;
use crate::service::ServiceControl;
use crate::state::StateStore;

/// One implementation of every host collaborator.
///
/// Cheaply cloneable; each field is an `Arc<dyn …>`.
#[derive(Clone)]
pub struct Host {
    pub bridge: Arc<dyn ProfileBridge>,
    pub connections: Arc<dyn ConnectionManager>,
    pub phonebook: Arc<dyn PhonebookStore>,
    pub interfaces: Arc<dyn InterfaceControl>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub services: Arc<dyn ServiceControl>,
    pub routes: Arc<dyn RouteSources>,
    pub state: Arc<dyn StateStore>,
}

impl Host {
    /// Build a `Host` where a single object serves every role.
    pub fn from_shared<T>(host: Arc<T>) -> Self
    where
        T: ProfileBridge
            + ConnectionManager
            + PhonebookStore
            + InterfaceControl
            + ArtifactStore
            + ServiceControl
            + RouteSources
            + StateStore
            + 'static,
    {
        Self {
            bridge: host.clone(),
            connections: host.clone(),
            phonebook: host.clone(),
            interfaces: host.clone(),
            artifacts: host.clone(),
            services: host.clone(),
            routes: host.clone(),
            state: host,
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}
