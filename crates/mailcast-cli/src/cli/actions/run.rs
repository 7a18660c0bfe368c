use crate::cli::actions::{dispatch, recipients, status, test_email, worker, Action};
use anyhow::Result;

/// Execute the provided action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Dispatch(args) => dispatch::execute(args).await,
        Action::Status(args) => status::execute(args).await,
        Action::Worker(args) => worker::execute(args).await,
        Action::Recipients(args) => recipients::execute(args).await,
        Action::TestEmail(args) => test_email::execute(args).await,
    }
}
