//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use tunnelward_config::ConfigError;
use tunnelward_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const VALIDATION: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFIG: i32 = 5;
    pub const BUSY: i32 = 6;
    pub const HOST: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("No profiles configured")]
    #[diagnostic(
        code(tunnelward::no_profiles),
        help(
            "Add a [profiles.user] or [profiles.machine] table to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoProfiles { path: String },

    #[error("No [profiles.{class}] table configured")]
    #[diagnostic(
        code(tunnelward::profile_not_configured),
        help("Add a [profiles.{class}] table to {path}")
    )]
    ProfileNotConfigured { class: String, path: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(
        code(tunnelward::config),
        help(
            "Check the config file and any TUNNELWARD_* environment variables.\n\
             Run: tunnelward config path"
        )
    )]
    Config { message: String },

    // ── Generation ───────────────────────────────────────────────────
    #[error("{count} profile(s) failed validation: {profiles}")]
    #[diagnostic(
        code(tunnelward::validation),
        help("Run: tunnelward validate to list every issue")
    )]
    GenerationFailed { count: usize, profiles: String },

    #[error("'{path}' is not a valid profile document: {message}")]
    #[diagnostic(code(tunnelward::invalid_document))]
    InvalidDocument { path: String, message: String },

    // ── Reconciliation ───────────────────────────────────────────────
    #[error("{resource} '{name}' not found")]
    #[diagnostic(code(tunnelward::not_found))]
    NotFound { resource: String, name: String },

    #[error("'{name}' is busy: {message}")]
    #[diagnostic(
        code(tunnelward::busy),
        help("The profile is in use. Disconnect it or retry later.")
    )]
    Busy { name: String, message: String },

    #[error("Host call failed: {message}")]
    #[diagnostic(code(tunnelward::host))]
    Host { message: String },

    #[error("{count} update(s) failed during reconcile")]
    #[diagnostic(
        code(tunnelward::reconcile_failed),
        help("Failed updates stay queued; rerun with -v for per-profile details.")
    )]
    ReconcileFailed { count: usize },

    #[error("Operation cancelled")]
    #[diagnostic(code(tunnelward::cancelled))]
    Cancelled,

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(tunnelward::usage))]
    Validation { field: String, reason: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(tunnelward::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("YAML output failed: {0}")]
    #[diagnostic(code(tunnelward::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML output failed: {0}")]
    #[diagnostic(code(tunnelward::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoProfiles { .. } | Self::Config { .. } => exit_code::CONFIG,
            Self::ProfileNotConfigured { .. } | Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::GenerationFailed { .. } | Self::InvalidDocument { .. } => exit_code::VALIDATION,
            Self::Busy { .. } => exit_code::BUSY,
            Self::Host { .. } => exit_code::HOST,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationFailed { profile, message } => CliError::GenerationFailed {
                count: 1,
                profiles: format!("{profile} ({message})"),
            },

            CoreError::Busy { name, message } => CliError::Busy { name, message },

            CoreError::NotFound { resource, name } => CliError::NotFound { resource, name },

            CoreError::Host { message } => CliError::Host { message },

            CoreError::VerificationMismatch { profile, fields } => CliError::Host {
                message: format!("'{profile}' does not match after create: {fields}"),
            },

            CoreError::Cancelled => CliError::Cancelled,

            CoreError::Config { message } => CliError::Config { message },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Config {
            message: err.to_string(),
        }
    }
}

impl From<tunnelward_api::Error> for CliError {
    fn from(err: tunnelward_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
