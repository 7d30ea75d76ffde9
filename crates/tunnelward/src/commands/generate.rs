//! Generate and validate command handlers.

use serde::Serialize;
use tabled::Tabled;
use tracing::info;
use tunnelward_core::{GenerationOutcome, Generator, document};

use crate::cli::{GenerateArgs, GlobalOpts, OutputFormat, SelectArgs};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Warnings")]
    warnings: usize,
    #[tabled(rename = "Failures")]
    failures: usize,
}

#[derive(Tabled)]
struct IssueRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Issue")]
    message: String,
}

#[derive(Serialize)]
struct ValidationSummary<'a> {
    valid: bool,
    profiles: Vec<ProfileSummary<'a>>,
}

#[derive(Serialize)]
struct ProfileSummary<'a> {
    name: &'a str,
    class: String,
    valid: bool,
    warnings: Vec<&'a str>,
    failures: Vec<&'a str>,
}

// ── Shared ───────────────────────────────────────────────────────────

fn run_generator(
    select: &SelectArgs,
    global: &GlobalOpts,
) -> Result<Vec<GenerationOutcome>, CliError> {
    let (config, path) = util::load_config(global)?;
    let settings = util::selected_settings(&config, select.class, &path)?;
    let generator = Generator::new(
        config.capability(),
        util::route_sources(&settings, select.offline),
    );
    let outcomes: Vec<_> = settings.iter().map(|s| generator.generate(s)).collect();
    info!(
        profiles = outcomes.len(),
        build = config.host.build,
        "generation finished"
    );
    Ok(outcomes)
}

fn failed(outcomes: &[GenerationOutcome]) -> Result<(), CliError> {
    let bad: Vec<&str> = outcomes
        .iter()
        .filter(|o| !o.is_ok())
        .map(|o| o.name.as_str())
        .collect();
    if bad.is_empty() {
        return Ok(());
    }
    Err(CliError::GenerationFailed {
        count: bad.len(),
        profiles: bad.join(", "),
    })
}

fn verdict(outcome: &GenerationOutcome) -> &'static str {
    if outcome.is_ok() { "valid" } else { "invalid" }
}

fn report_issues(outcome: &GenerationOutcome, quiet: bool) {
    for issue in &outcome.failures {
        eprintln!("error: {}: {}", outcome.name, issue.message);
    }
    if quiet {
        return;
    }
    for issue in &outcome.warnings {
        eprintln!("warning: {}: {}", outcome.name, issue.message);
    }
}

// ── Generate ─────────────────────────────────────────────────────────

pub fn handle_generate(args: &GenerateArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let outcomes = run_generator(&args.select, global)?;

    match global.output {
        OutputFormat::Table | OutputFormat::Plain => {
            let labelled = outcomes.len() > 1;
            let mut docs = Vec::new();
            for outcome in &outcomes {
                report_issues(outcome, global.quiet);
                let Some(doc) = outcome.document.as_deref() else {
                    continue;
                };
                let doc = if args.pretty {
                    document::parse(doc)
                        .and_then(|root| document::render_pretty(&root))
                        .map_err(|e| CliError::InvalidDocument {
                            path: outcome.name.clone(),
                            message: e.to_string(),
                        })?
                } else {
                    doc.to_owned()
                };
                if labelled {
                    docs.push(format!("<!-- {} ({}) -->\n{doc}", outcome.name, outcome.class));
                } else {
                    docs.push(doc);
                }
            }
            output::print_output(&docs.join("\n"), global.quiet);
        }
        ref structured => {
            let out = output::render_structured(structured, &outcomes)?;
            output::print_output(&out, global.quiet);
        }
    }

    failed(&outcomes)
}

// ── Validate ─────────────────────────────────────────────────────────

pub fn handle_validate(args: &SelectArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let outcomes = run_generator(args, global)?;
    let color = output::should_color(&global.color);

    let out = match global.output {
        OutputFormat::Table => {
            let rows: Vec<OutcomeRow> = outcomes
                .iter()
                .map(|o| OutcomeRow {
                    name: o.name.clone(),
                    class: o.class.to_string(),
                    status: output::status(verdict(o), o.is_ok(), color),
                    warnings: o.warnings.len(),
                    failures: o.failures.len(),
                })
                .collect();
            let issues: Vec<IssueRow> = outcomes
                .iter()
                .flat_map(|o| {
                    o.failures.iter().chain(&o.warnings).map(|i| IssueRow {
                        name: o.name.clone(),
                        severity: i.severity.to_string(),
                        message: i.message.clone(),
                    })
                })
                .collect();
            let mut out = output::render_table(&rows);
            if !issues.is_empty() {
                out.push_str("\n\n");
                out.push_str(&output::render_table(&issues));
            }
            out
        }
        OutputFormat::Plain => outcomes
            .iter()
            .map(|o| format!("{}\t{}", o.name, verdict(o)))
            .collect::<Vec<_>>()
            .join("\n"),
        ref structured => {
            let summary = ValidationSummary {
                valid: outcomes.iter().all(GenerationOutcome::is_ok),
                profiles: outcomes
                    .iter()
                    .map(|o| ProfileSummary {
                        name: &o.name,
                        class: o.class.to_string(),
                        valid: o.is_ok(),
                        warnings: o.warnings.iter().map(|i| i.message.as_str()).collect(),
                        failures: o.failures.iter().map(|i| i.message.as_str()).collect(),
                    })
                    .collect(),
            };
            output::render_structured(structured, &summary)?
        }
    };
    output::print_output(&out, global.quiet);

    failed(&outcomes)
}
