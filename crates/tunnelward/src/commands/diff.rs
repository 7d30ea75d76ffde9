//! Document diff handler.

use std::path::Path;

use serde::Serialize;
use tabled::Tabled;
use tunnelward_core::Profile;

use crate::cli::{DiffArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Serialize)]
struct Difference {
    field: &'static str,
    difference: String,
}

#[derive(Tabled)]
struct DifferenceRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Difference")]
    difference: String,
}

/// Parse a document file. Both sides share one name so the name never
/// shows up as a difference.
pub fn load_profile(path: &Path) -> Result<Profile, CliError> {
    let xml = util::read_file(path)?;
    let profile = Profile::from_document("profile", &xml);
    if !profile.load_error.is_empty() {
        return Err(CliError::InvalidDocument {
            path: path.display().to_string(),
            message: profile.load_error,
        });
    }
    Ok(profile)
}

pub fn handle(args: &DiffArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let left = load_profile(&args.left)?;
    let right = load_profile(&args.right)?;

    let differences: Vec<Difference> = left
        .diff(&right)
        .into_iter()
        .map(|(field, difference)| Difference { field, difference })
        .collect();

    if differences.is_empty() {
        if !global.quiet {
            eprintln!("Profiles match");
        }
        return Ok(());
    }

    let out = output::render_list(
        &global.output,
        &differences,
        |d| DifferenceRow {
            field: d.field,
            difference: d.difference.clone(),
        },
        |d| d.field.to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
