use super::load_config;
use anyhow::{Context, Result};
use mailcast_mail::{Recipient, RecipientStore};
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Command {
    List,
    Add {
        name: String,
        email: String,
    },
    Edit {
        index: usize,
        name: Option<String>,
        email: Option<String>,
    },
    Remove {
        index: usize,
    },
    Import {
        path: PathBuf,
    },
    Export {
        path: PathBuf,
    },
}

#[derive(Debug)]
pub struct Args {
    pub config_dir: PathBuf,
    pub file: Option<PathBuf>,
    pub command: Command,
}

/// Applies one change to the recipient list, or prints it.
/// # Errors
/// Returns an error if the file cannot be read or written, or the change is
/// rejected.
pub async fn execute(args: Args) -> Result<()> {
    let (_, config) = load_config(&args.config_dir).await?;
    let path = args
        .file
        .clone()
        .unwrap_or_else(|| config.dispatch.recipients_path.clone());

    let message = apply(&RecipientStore::new(path), args.command)?;
    println!("{message}");
    Ok(())
}

fn apply(store: &RecipientStore, command: Command) -> Result<String> {
    store
        .ensure_exists()
        .with_context(|| format!("cannot create {}", store.path().display()))?;

    let message = match command {
        Command::List => {
            let list = store.load_all()?;
            render_list(&list.recipients, list.skipped)
        }
        Command::Add { name, email } => {
            let added = store.add(&name, &email)?;
            format!("Added {}", display(&added))
        }
        Command::Edit { index, name, email } => {
            let updated = store
                .edit(index, name.as_deref(), email.as_deref())
                .with_context(|| format!("cannot edit recipient {}", index + 1))?;
            format!("Recipient {} is now {}", index + 1, display(&updated))
        }
        Command::Remove { index } => {
            let removed = store
                .remove(index)
                .with_context(|| format!("cannot remove recipient {}", index + 1))?;
            format!("Removed {}", display(&removed))
        }
        Command::Import { path } => {
            let report = store
                .import(&path)
                .with_context(|| format!("cannot import {}", path.display()))?;
            format!(
                "{} recipients imported, {} rows skipped",
                report.imported, report.skipped
            )
        }
        Command::Export { path } => {
            let count = store
                .export(&path)
                .with_context(|| format!("cannot export to {}", path.display()))?;
            format!("{count} recipients exported to {}", path.display())
        }
    };
    Ok(message)
}

fn display(recipient: &Recipient) -> String {
    format!("{} <{}>", recipient.name, recipient.email)
}

fn render_list(recipients: &[Recipient], skipped: usize) -> String {
    if recipients.is_empty() {
        return "No recipient.".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{} recipients", recipients.len());
    for (i, recipient) in recipients.iter().enumerate() {
        let _ = writeln!(out, "{:>4}. {}", i + 1, display(recipient));
    }
    if skipped > 0 {
        let _ = writeln!(out, "{skipped} malformed rows ignored");
    }
    out.trim_end().to_string()
}
