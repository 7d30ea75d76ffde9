//! Host collaborator contracts for the tunnelward reconciliation engine.
//!
//! The engine never talks to the operating system directly. Every OS-facing
//! concern is expressed as a synchronous trait in this crate:
//!
//! - **[`ProfileBridge`]**: the management-instrumentation surface that
//!   accepts and returns profile documents.
//! - **[`ConnectionManager`]**: connection entries, OS-only entry
//!   properties, proxy settings, dial/hangup of active connections.
//! - **[`PhonebookStore`]**: the legacy phonebook key/value store. A
//!   file-backed implementation lives in [`pbk`].
//! - **[`InterfaceControl`]**, **[`ArtifactStore`]**, **[`ServiceControl`]**,
//!   **[`RouteSources`]**, **[`StateStore`]**: the remaining side channels.
//!
//! [`memory::MemoryHost`] implements all of them in memory for tests and
//! the CLI simulator. [`Host`] bundles one implementation of each so the
//! core crate can take a single cheaply-cloneable handle.

pub mod artifacts;
pub mod bridge;
pub mod connection;
pub mod error;
pub mod host;
pub mod interface;
pub mod memory;
pub mod pbk;
pub mod phonebook;
pub mod routes;
pub mod service;
pub mod state;

pub use artifacts::{ArtifactStore, NetworkBinding, TrackedResource};
pub use bridge::ProfileBridge;
pub use connection::{
    ActiveConnection, ConnectionHandle, ConnectionManager, ConnectionStatus, EntryProperties,
    ProxySettings,
};
pub use error::Error;
pub use host::Host;
pub use interface::InterfaceControl;
pub use memory::{HostCall, MemoryEntry, MemoryHost, MemorySnapshot};
pub use pbk::FilePhonebook;
pub use phonebook::{PhonebookScope, PhonebookSection, PhonebookStore};
pub use routes::{RouteSources, SystemRouteSources};
pub use service::ServiceControl;
pub use state::{FileStateStore, StateStore};
