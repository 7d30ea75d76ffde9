// ── Core error types ──
//
// Reconciliation failures, classified by how the engine reacts to them.
// Consumers never see raw host errors; the `From<tunnelward_api::Error>`
// impl translates them into this taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Generation ───────────────────────────────────────────────────
    /// Desired settings could not produce a profile.
    #[error("Validation failed for '{profile}': {message}")]
    ValidationFailed { profile: String, message: String },

    // ── Transient ────────────────────────────────────────────────────
    /// The host reported the resource busy. Worth retrying.
    #[error("'{name}' is busy: {message}")]
    Busy { name: String, message: String },

    // ── Already satisfied ────────────────────────────────────────────
    #[error("{resource} '{name}' not found")]
    NotFound { resource: String, name: String },

    // ── Fatal for this tick ──────────────────────────────────────────
    #[error("Host call failed: {message}")]
    Host { message: String },

    /// Post-create read-back differs from what was installed.
    #[error("'{profile}' does not match after create: {fields}")]
    VerificationMismatch { profile: String, fields: String },

    #[error("Operation cancelled")]
    Cancelled,

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Transient failures are left queued and retried on the next tick
    /// without being logged as errors.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ── Conversion from host errors ──────────────────────────────────────

impl From<tunnelward_api::Error> for CoreError {
    fn from(err: tunnelward_api::Error) -> Self {
        match err {
            tunnelward_api::Error::NotFound { resource, name } => CoreError::NotFound {
                resource: resource.to_owned(),
                name,
            },
            tunnelward_api::Error::InUse { name } => CoreError::Busy {
                name,
                message: "in use by an active connection".into(),
            },
            tunnelward_api::Error::Unsupported(op) => CoreError::Host {
                message: format!("operation not supported by host: {op}"),
            },
            other @ (tunnelward_api::Error::Rejected { .. }
            | tunnelward_api::Error::Os { .. }
            | tunnelward_api::Error::Phonebook { .. }
            | tunnelward_api::Error::Fetch { .. }
            | tunnelward_api::Error::Io(_)
            | tunnelward_api::Error::Json(_)) => CoreError::Host {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_use_maps_to_transient_busy() {
        let err: CoreError = tunnelward_api::Error::InUse {
            name: "Corp".into(),
        }
        .into();
        assert!(err.is_transient());
    }

    #[test]
    fn not_found_survives_translation() {
        let err: CoreError = tunnelward_api::Error::not_found("profile", "Corp").into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "profile 'Corp' not found");
    }

    #[test]
    fn os_failures_are_fatal_host_errors() {
        let err: CoreError = tunnelward_api::Error::Os {
            code: 87,
            message: "invalid parameter".into(),
        }
        .into();
        assert!(!err.is_transient());
        assert!(matches!(err, CoreError::Host { .. }));
    }
}
