//! Command dispatch: routes parsed CLI commands to their handlers.

pub mod config_cmd;
pub mod diff;
pub mod generate;
pub mod reconcile;
pub mod show;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Route a command to its handler. Completions are handled in `main`.
pub fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Generate(args) => generate::handle_generate(&args, global),
        Command::Validate(args) => generate::handle_validate(&args, global),
        Command::Diff(args) => diff::handle(&args, global),
        Command::Show(args) => show::handle(&args, global),
        Command::Reconcile(args) => reconcile::handle(&args, global),
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Completions(_) => unreachable!("completions are generated before dispatch"),
    }
}
