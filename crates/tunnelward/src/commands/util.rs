//! Shared helpers for command handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use tunnelward_api::{MemoryHost, RouteSources, SystemRouteSources};
use tunnelward_config::Config;
use tunnelward_core::ProfileSettings;

use crate::cli::{ClassArg, GlobalOpts};
use crate::error::CliError;

/// Load and validate the configuration named by `--config`, or the default
/// file. Returns the path alongside for error messages.
pub fn load_config(global: &GlobalOpts) -> Result<(Config, PathBuf), CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(tunnelward_config::config_path);
    let config = tunnelward_config::load_config_from(&path)?;
    config.validate()?;
    Ok((config, path))
}

/// Configured profiles, narrowed to one class when `class` is given.
pub fn selected_settings(
    config: &Config,
    class: Option<ClassArg>,
    path: &Path,
) -> Result<Vec<ProfileSettings>, CliError> {
    let path = path.display().to_string();
    match class {
        Some(class) => {
            let class = class.into();
            config
                .settings_for(class)
                .map(|s| vec![s])
                .ok_or(CliError::ProfileNotConfigured {
                    class: class.to_string(),
                    path,
                })
        }
        None => {
            let all = config.profile_settings();
            if all.is_empty() {
                return Err(CliError::NoProfiles { path });
            }
            Ok(all)
        }
    }
}

/// Live sources only when some profile computes routes from them. Offline
/// runs get a source whose fetches fail, which generation reports as
/// warnings.
pub fn route_sources(settings: &[ProfileSettings], offline: bool) -> Arc<dyn RouteSources> {
    let needed = settings
        .iter()
        .any(|s| s.exclude_office365 || !s.include_route_hostnames.is_empty());
    if needed && !offline {
        match SystemRouteSources::new() {
            Ok(sources) => return Arc::new(sources),
            Err(e) => warn!(error = %e, "route sources unavailable; computed routes skipped"),
        }
    }
    debug!(needed, offline, "using offline route sources");
    Arc::new(MemoryHost::new())
}

pub fn read_file(path: &Path) -> Result<String, CliError> {
    Ok(std::fs::read_to_string(path)?)
}

pub fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
