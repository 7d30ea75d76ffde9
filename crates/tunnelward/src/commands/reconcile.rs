//! Reconcile handler: one engine pass against a simulated host.
//!
//! The host starts from a JSON [`MemorySnapshot`] (or empty), the configured
//! profiles are generated and queued, and a single tick runs. The resulting
//! snapshot can be written back so consecutive runs chain.

use std::fmt::Write as _;
use std::sync::Arc;

use strum::IntoEnumIterator;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tunnelward_api::{FileStateStore, Host, MemoryHost, MemorySnapshot};
use tunnelward_config::Config;
use tunnelward_core::{
    ApplyReport, Engine, EngineConfig, Generator, ProfileClass, ProfileSettings, TickReport,
    phonebook,
};

use crate::cli::{GlobalOpts, OutputFormat, ReconcileArgs};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ────────────────────────────────────────────────────────

#[derive(Tabled)]
struct ApplyRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Corrections")]
    corrections: String,
    #[tabled(rename = "Warnings")]
    warnings: usize,
}

fn action(report: &ApplyReport) -> String {
    let mut steps = Vec::new();
    if report.deleted {
        steps.push("deleted");
    }
    if report.created {
        steps.push("created");
    }
    if report.redialed {
        steps.push("redialed");
    }
    if steps.is_empty() {
        return if report.corrections.is_empty() {
            "unchanged".into()
        } else {
            "corrected".into()
        };
    }
    steps.join(", ")
}

impl From<&ApplyReport> for ApplyRow {
    fn from(r: &ApplyReport) -> Self {
        Self {
            name: r.name.clone(),
            action: action(r),
            corrections: if r.corrections.is_empty() {
                "-".into()
            } else {
                r.corrections.join(", ")
            },
            warnings: r.warnings.len(),
        }
    }
}

fn summary(report: &TickReport) -> String {
    let mut out = String::new();
    if report.applied.is_empty() {
        let _ = writeln!(out, "Nothing applied");
    } else {
        let rows: Vec<ApplyRow> = report.applied.iter().map(ApplyRow::from).collect();
        let _ = writeln!(out, "{}", output::render_table(&rows));
    }
    if !report.connected.is_empty() {
        let _ = writeln!(out, "Connected: {}", report.connected.join(", "));
    }
    if !report.deferred.is_empty() {
        let _ = writeln!(out, "Deferred:  {}", report.deferred.join(", "));
    }
    for failure in &report.failed {
        let _ = writeln!(out, "Failed:    {}: {}", failure.name, failure.error);
    }
    let _ = writeln!(out, "Pending:   {}", report.pending);
    if report.restart_issued {
        let _ = writeln!(out, "Service restart issued");
    }
    out.trim_end().to_owned()
}

// ── Setup ────────────────────────────────────────────────────────────

fn load_snapshot(args: &ReconcileArgs) -> Result<MemorySnapshot, CliError> {
    match &args.snapshot {
        Some(path) => Ok(serde_json::from_str(&util::read_file(path)?)?),
        None => Ok(MemorySnapshot::default()),
    }
}

fn desired(
    config: &Config,
    args: &ReconcileArgs,
    path: &std::path::Path,
) -> Result<Vec<ProfileSettings>, CliError> {
    match util::selected_settings(config, args.class, path) {
        // Pruning with nothing configured deletes every managed profile.
        Err(CliError::NoProfiles { .. }) if args.prune => Ok(Vec::new()),
        other => other,
    }
}

/// Classes whose stored managed profile has no configured table.
fn orphans(
    config: &Config,
    host: &Host,
    args: &ReconcileArgs,
) -> Result<Vec<(String, ProfileClass)>, CliError> {
    let only = args.class.map(ProfileClass::from);
    let mut out = Vec::new();
    for class in ProfileClass::iter() {
        if only.is_some_and(|c| c != class) || config.settings_for(class).is_some() {
            continue;
        }
        if let Some(name) = host.state.load_managed(&class.to_string())? {
            out.push((name, class));
        }
    }
    Ok(out)
}

// ── Handler ──────────────────────────────────────────────────────────

pub fn handle(args: &ReconcileArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (config, path) = util::load_config(global)?;
    let settings = desired(&config, args, &path)?;

    let memory = Arc::new(
        MemoryHost::from_snapshot(load_snapshot(args)?).with_materializer(phonebook::materialize),
    );
    let mut host = Host::from_shared(memory.clone());
    if let Some(state) = &args.state {
        host.state = Arc::new(FileStateStore::new(state));
    }

    let engine_config = EngineConfig {
        delete_retry_pause_ms: 0,
        settle_delay_ms: 0,
        poll_interval_ms: 0,
        ..config.engine.clone()
    };
    let engine = Engine::new(host.clone(), engine_config, CancellationToken::new());
    let adopted = engine.seed_from_state()?;
    info!(adopted, "seeded managed profiles");

    // Computed routes come from the snapshot's Office 365 list and DNS table.
    let generator = Generator::new(config.capability(), host.routes.clone());
    let mut invalid = Vec::new();
    for s in &settings {
        let outcome = generator.generate(s);
        for issue in &outcome.warnings {
            warn!(profile = %outcome.name, issue = %issue.message, "generation warning");
        }
        if !outcome.is_ok() {
            for issue in &outcome.failures {
                eprintln!("error: {}: {}", outcome.name, issue.message);
            }
            invalid.push(outcome.name);
            continue;
        }
        engine.schedule_upsert(outcome.into_managed()?);
    }

    if args.prune {
        for (name, class) in orphans(&config, &host, args)? {
            info!(profile = %name, %class, "pruning unconfigured profile");
            engine.schedule_delete(&name, class);
        }
    }

    let report = engine.tick();

    if let Some(out_path) = &args.write {
        std::fs::write(out_path, serde_json::to_string_pretty(&memory.snapshot())?)?;
        info!(path = %out_path.display(), "snapshot written");
    }

    let out = match global.output {
        OutputFormat::Table => summary(&report),
        OutputFormat::Plain => report
            .applied
            .iter()
            .map(|r| r.name.clone())
            .collect::<Vec<_>>()
            .join("\n"),
        ref structured => output::render_structured(structured, &report)?,
    };
    output::print_output(&out, global.quiet);

    if !invalid.is_empty() {
        return Err(CliError::GenerationFailed {
            count: invalid.len(),
            profiles: invalid.join(", "),
        });
    }
    if !report.failed.is_empty() {
        return Err(CliError::ReconcileFailed {
            count: report.failed.len(),
        });
    }
    Ok(())
}
