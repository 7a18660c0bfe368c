use crate::cli::actions::{dispatch, recipients, status, test_email, worker, Action};
use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use mailcast_dispatch::DispatchMode;
use mailcast_jobs::JobId;
use std::path::PathBuf;

/// Maps parsed arguments to the action to run.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let (name, sub) = matches
        .subcommand()
        .context("missing subcommand; see `mailcast --help`")?;
    let config_dir = config_dir(sub);

    match name {
        "dispatch" => Ok(Action::Dispatch(dispatch_args(config_dir, sub)?)),
        "status" => Ok(Action::Status(status_args(config_dir, sub)?)),
        "worker" => Ok(Action::Worker(worker::Args {
            config_dir,
            concurrency: sub.get_one::<usize>("concurrency").copied(),
        })),
        "recipients" => Ok(Action::Recipients(recipients_args(config_dir, sub)?)),
        "test-email" => Ok(Action::TestEmail(test_email::Args {
            config_dir,
            to: sub.get_one::<String>("to").cloned(),
            template: sub.get_one::<PathBuf>("template").cloned(),
        })),
        other => bail!("unknown subcommand: {other}"),
    }
}

fn config_dir(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<PathBuf>("config-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("./config"))
}

fn dispatch_args(config_dir: PathBuf, matches: &ArgMatches) -> Result<dispatch::Args> {
    let mode = matches
        .get_one::<String>("mode")
        .map_or(Ok(DispatchMode::default()), |m| m.parse::<DispatchMode>())
        .map_err(|e| anyhow!(e))?;

    Ok(dispatch::Args {
        config_dir,
        mode,
        delay_secs: matches.get_one::<u64>("delay").copied(),
        limit: matches.get_one::<usize>("limit").copied(),
        simulate: matches.get_flag("simulate"),
        recipients: matches.get_one::<PathBuf>("recipients").cloned(),
        template: matches.get_one::<PathBuf>("template").cloned(),
        assume_yes: matches.get_flag("yes"),
    })
}

fn status_args(config_dir: PathBuf, matches: &ArgMatches) -> Result<status::Args> {
    let query = if matches.get_flag("list") {
        status::Query::Active {
            max: matches.get_one::<usize>("max").copied().unwrap_or(50),
        }
    } else {
        let handle = matches
            .get_one::<String>("handle")
            .context("missing job handle")?;
        let job_id = JobId::from(handle.trim());
        if matches.get_flag("bulk") {
            status::Query::Bulk(job_id)
        } else {
            status::Query::Job(job_id)
        }
    };

    Ok(status::Args {
        config_dir,
        query,
        json: matches.get_flag("json"),
    })
}

fn index(matches: &ArgMatches) -> Result<usize> {
    let position = matches
        .get_one::<u64>("index")
        .copied()
        .context("missing recipient index")?;
    // Positions are shown starting at 1.
    usize::try_from(position - 1).context("recipient index out of range")
}

fn recipients_args(config_dir: PathBuf, matches: &ArgMatches) -> Result<recipients::Args> {
    let (name, sub) = matches
        .subcommand()
        .context("missing recipients subcommand")?;
    let path = |m: &ArgMatches| {
        m.get_one::<PathBuf>("path")
            .cloned()
            .context("missing file path")
    };

    let command = match name {
        "list" => recipients::Command::List,
        "add" => recipients::Command::Add {
            name: sub.get_one::<String>("name").cloned().unwrap_or_default(),
            email: sub.get_one::<String>("email").cloned().unwrap_or_default(),
        },
        "edit" => recipients::Command::Edit {
            index: index(sub)?,
            name: sub.get_one::<String>("name").cloned(),
            email: sub.get_one::<String>("email").cloned(),
        },
        "remove" => recipients::Command::Remove { index: index(sub)? },
        "import" => recipients::Command::Import { path: path(sub)? },
        "export" => recipients::Command::Export { path: path(sub)? },
        other => bail!("unknown recipients subcommand: {other}"),
    };

    Ok(recipients::Args {
        config_dir,
        file: sub
            .get_one::<PathBuf>("file")
            .or_else(|| matches.get_one::<PathBuf>("file"))
            .cloned(),
        command,
    })
}
