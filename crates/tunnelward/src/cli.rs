//! Clap derive structures for the `tunnelward` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tunnelward_config::{ConfigValue, Scope};
use tunnelward_core::ProfileClass;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tunnelward: desired-state management for always-on VPN profiles
#[derive(Debug, Parser)]
#[command(
    name = "tunnelward",
    version,
    about = "Generate, validate and reconcile always-on VPN profiles",
    long_about = "Builds VPN profile documents from declarative settings and drives\n\
        the reconciliation engine that keeps installed profiles in line with them.\n\n\
        `reconcile` runs the engine against a simulated host loaded from a JSON\n\
        snapshot, so every change can be previewed without touching the OS.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "TUNNELWARD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "TUNNELWARD_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

/// Tunnel class as accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ClassArg {
    /// Device tunnel
    Machine,
    /// Primary user tunnel
    User,
    /// Backup user tunnel
    UserBackup,
}

impl From<ClassArg> for ProfileClass {
    fn from(arg: ClassArg) -> Self {
        match arg {
            ClassArg::Machine => Self::Machine,
            ClassArg::User => Self::User,
            ClassArg::UserBackup => Self::UserBackup,
        }
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render profile documents from the configured settings
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Check configured settings without printing documents
    Validate(SelectArgs),

    /// Compare two profile documents field by field
    Diff(DiffArgs),

    /// Show a profile document, optionally merged with its phonebook entry
    Show(ShowArgs),

    /// Run one reconciliation pass against a simulated host
    Reconcile(ReconcileArgs),

    /// Inspect configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Generation ───────────────────────────────────────────────────────

/// Shared profile selection arguments.
#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Only this tunnel class
    #[arg(long, short = 'c')]
    pub class: Option<ClassArg>,

    /// Never query live route sources; computed routes fall back to nothing
    #[arg(long)]
    pub offline: bool,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Indent the rendered documents
    #[arg(long)]
    pub pretty: bool,
}

// ── Documents ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// First profile document
    pub left: PathBuf,

    /// Second profile document
    pub right: PathBuf,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Profile document
    pub document: PathBuf,

    /// Phonebook file holding the entry's OS-only values
    #[arg(long)]
    pub phonebook: Option<PathBuf>,

    /// Phonebook section name (defaults to the document's file stem)
    #[arg(long)]
    pub name: Option<String>,

    /// Read the all-users phonebook scope instead of the current user's
    #[arg(long)]
    pub all_users: bool,
}

// ── Reconcile ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// JSON host snapshot to start from (empty host if omitted)
    #[arg(long, short = 's')]
    pub snapshot: Option<PathBuf>,

    /// Write the host snapshot after the pass to this file
    #[arg(long, short = 'w')]
    pub write: Option<PathBuf>,

    /// Persist managed profile names in this JSON file instead of the snapshot
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Only this tunnel class
    #[arg(long, short = 'c')]
    pub class: Option<ClassArg>,

    /// Delete managed profiles whose class is no longer configured
    #[arg(long)]
    pub prune: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display current resolved configuration
    Show,

    /// Read one value through the typed config store
    Get {
        /// Config key (dot-separated path, e.g., "engine.tick_interval_secs")
        key: String,

        /// Configuration layer
        #[arg(long, default_value = "machine")]
        scope: ScopeArg,

        /// Shape to read the value as
        #[arg(long = "as", default_value = "string")]
        kind: ValueKind,

        /// User-layer config file
        #[arg(long)]
        user_file: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScopeArg {
    Machine,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Machine => Self::Machine,
            ScopeArg::User => Self::User,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ValueKind {
    String,
    Int,
    Bool,
    List,
    Map,
}

impl ValueKind {
    /// The empty value of this shape, used as the read default.
    pub fn empty(self) -> ConfigValue {
        match self {
            Self::String => ConfigValue::String(String::new()),
            Self::Int => ConfigValue::Int(0),
            Self::Bool => ConfigValue::Bool(false),
            Self::List => ConfigValue::List(Vec::new()),
            Self::Map => ConfigValue::Map(std::collections::BTreeMap::new()),
        }
    }
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
