// tunnelward-core: Profile model, generator and reconciliation engine between
// tunnelward-api host collaborators and consumers (CLI, service host).

pub mod access;
pub mod applier;
pub mod capability;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod generator;
pub mod model;
pub mod phonebook;
pub mod restart;
pub mod scheduler;
pub mod settings;

// ── Primary re-exports ──────────────────────────────────────────────
pub use applier::{Applier, ApplyReport};
pub use capability::HostCapability;
pub use config::EngineConfig;
pub use engine::{Engine, TickFailure, TickReport, TickTrigger, run};
pub use error::CoreError;
pub use generator::{GenerationIssue, GenerationOutcome, Generator, RouteCache, Severity};
pub use restart::{RestartCoordinator, RestartFailure};
pub use scheduler::Scheduler;
pub use settings::{DniSetting, EapSettings, FilterFields, FilterSetting, ProfileSettings};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Profile aggregate
    ManagedProfile, Profile, ProfileClass, ProfileSource, RuntimeAttributes,
    // Parts
    CryptographySuite, DomainNameInformation, Route, TrafficFilter,
    // Enumerations
    AuthMethod, EntryOption, EntryOptions, NativeProtocol, RoutingPolicy, VpnStrategy,
};
