use crate::cli::{actions::Action, commands, dispatch::handler};
use anyhow::Result;

/// Parses the command line into an [`Action`].
///
/// # Errors
/// Returns an error if the arguments are inconsistent.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();
    handler(&matches)
}
