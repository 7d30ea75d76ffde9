use thiserror::Error;

/// Top-level error type for the `tunnelward-api` crate.
///
/// Covers every failure mode a host collaborator can report. The core
/// crate maps these into its reconciliation taxonomy (transient, not-found,
/// fatal).
#[derive(Debug, Error)]
pub enum Error {
    // ── Lookup ──────────────────────────────────────────────────────
    /// The named resource does not exist on the host.
    #[error("{resource} '{name}' not found")]
    NotFound { resource: &'static str, name: String },

    // ── Transient ───────────────────────────────────────────────────
    /// The resource is held by an active connection or mid-negotiation.
    #[error("'{name}' is in use and cannot be modified right now")]
    InUse { name: String },

    // ── Host failures ───────────────────────────────────────────────
    /// The host accepted the call but refused the payload.
    #[error("host rejected request: {message}")]
    Rejected { message: String },

    /// An OS call failed with a native error code.
    #[error("host call failed (code {code}): {message}")]
    Os { code: u32, message: String },

    /// The phonebook file could not be parsed.
    #[error("phonebook parse error at line {line}: {message}")]
    Phonebook { line: usize, message: String },

    /// A remote route source (endpoint service, resolver) failed.
    #[error("{source_name} fetch failed: {message}")]
    Fetch {
        source_name: &'static str,
        message: String,
    },

    /// The collaborator does not implement this operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    // ── IO / Serialization ──────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand constructor for [`Error::NotFound`].
    pub fn not_found(resource: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            name: name.into(),
        }
    }

    /// Returns `true` if the host reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the failure is a busy/in-use condition that is
    /// worth retrying after the holder lets go.
    pub fn is_in_use(&self) -> bool {
        matches!(self, Self::InUse { .. })
    }
}
