//! Config subcommand handlers.

use tunnelward_config::{ConfigStore, FileConfigStore};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(tunnelward_config::config_path);
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let (config, _) = util::load_config(global)?;
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&config)?,
                ref structured => output::render_structured(structured, &config)?,
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Get {
            key,
            scope,
            kind,
            user_file,
        } => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(tunnelward_config::config_path);
            let store = FileConfigStore::open(&path, user_file.as_deref())?;
            let value = store.read(&key, scope.into(), kind.empty());
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => value.to_string(),
                ref structured => output::render_structured(structured, &value)?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
