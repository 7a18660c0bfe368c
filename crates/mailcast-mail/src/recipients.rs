//! CSV-backed recipient store.
//!
//! The file has a `name,email` header. Rows missing either column, or with
//! an empty address, are skipped when reading and counted.

use crate::error::{MailError, MailResult};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub email: String,
}

impl Recipient {
    /// Creates a recipient with trimmed fields.
    pub fn new(name: impl AsRef<str>, email: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().to_string(),
            email: email.as_ref().trim().to_string(),
        }
    }
}

/// Recipients read from a file plus the number of rows skipped.
#[derive(Debug, Clone, Default)]
pub struct RecipientList {
    pub recipients: Vec<Recipient>,
    pub skipped: usize,
}

/// Outcome of [`RecipientStore::import`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

/// Recipient list stored as a CSV file.
#[derive(Debug, Clone)]
pub struct RecipientStore {
    path: PathBuf,
}

impl RecipientStore {
    /// Creates a store over `path`. The file is not touched.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the file with its header if it does not exist.
    pub fn ensure_exists(&self) -> MailResult<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        self.save(&[])?;
        info!(path = %self.path.display(), "Created recipient file");
        Ok(())
    }

    /// Reads every well-formed row in file order.
    pub fn load_all(&self) -> MailResult<RecipientList> {
        if !self.path.exists() {
            return Err(MailError::RecipientsNotFound(self.path.clone()));
        }
        read_recipients(&self.path)
    }

    /// Reads at most the first `limit` well-formed rows.
    pub fn load_first(&self, limit: usize) -> MailResult<RecipientList> {
        let mut list = self.load_all()?;
        list.recipients.truncate(limit);
        Ok(list)
    }

    /// Appends a recipient after validating it.
    pub fn add(&self, name: &str, email: &str) -> MailResult<Recipient> {
        let recipient = Recipient::new(name, email);
        validate(&recipient)?;

        let mut recipients = self.current()?;
        if contains_email(&recipients, &recipient.email, None) {
            return Err(MailError::DuplicateRecipient(recipient.email));
        }

        recipients.push(recipient.clone());
        self.save(&recipients)?;
        debug!(email = %recipient.email, "Recipient added");
        Ok(recipient)
    }

    /// Updates the name and/or address at a zero-based position.
    pub fn edit(
        &self,
        index: usize,
        name: Option<&str>,
        email: Option<&str>,
    ) -> MailResult<Recipient> {
        let mut recipients = self.current()?;
        let len = recipients.len();
        if index >= len {
            return Err(MailError::IndexOutOfRange { index, len });
        }

        let mut updated = recipients[index].clone();
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            updated.name = name.to_string();
        }
        if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
            if !email.contains('@') {
                return Err(MailError::InvalidRecipient(format!(
                    "'{email}' is not an email address"
                )));
            }
            if contains_email(&recipients, email, Some(index)) {
                return Err(MailError::DuplicateRecipient(email.to_string()));
            }
            updated.email = email.to_string();
        }

        recipients[index] = updated.clone();
        self.save(&recipients)?;
        Ok(updated)
    }

    /// Removes the recipient at a zero-based position.
    pub fn remove(&self, index: usize) -> MailResult<Recipient> {
        let mut recipients = self.current()?;
        let len = recipients.len();
        if index >= len {
            return Err(MailError::IndexOutOfRange { index, len });
        }

        let removed = recipients.remove(index);
        self.save(&recipients)?;
        Ok(removed)
    }

    /// Merges another `name,email` file. Addresses are lowercased; rows
    /// without a valid address or already present are skipped.
    pub fn import(&self, source: &Path) -> MailResult<ImportReport> {
        if !source.exists() {
            return Err(MailError::RecipientsNotFound(source.to_path_buf()));
        }

        let mut recipients = self.current()?;
        let mut known: HashSet<String> = recipients.iter().map(|r| r.email.to_lowercase()).collect();
        let incoming = read_recipients(source)?;

        let mut report = ImportReport {
            imported: 0,
            skipped: incoming.skipped,
        };
        for recipient in incoming.recipients {
            let email = recipient.email.to_lowercase();
            if !email.contains('@') || !known.insert(email.clone()) {
                report.skipped += 1;
                continue;
            }
            recipients.push(Recipient {
                name: recipient.name,
                email,
            });
            report.imported += 1;
        }

        self.save(&recipients)?;
        info!(
            imported = report.imported,
            skipped = report.skipped,
            "Recipients imported"
        );
        Ok(report)
    }

    /// Writes the current list to another file.
    pub fn export(&self, destination: &Path) -> MailResult<usize> {
        let recipients = self.load_all()?.recipients;
        write_recipients(destination, &recipients)?;
        Ok(recipients.len())
    }

    fn current(&self) -> MailResult<Vec<Recipient>> {
        self.ensure_exists()?;
        Ok(read_recipients(&self.path)?.recipients)
    }

    fn save(&self, recipients: &[Recipient]) -> MailResult<()> {
        write_recipients(&self.path, recipients)
    }
}

fn validate(recipient: &Recipient) -> MailResult<()> {
    if recipient.name.is_empty() {
        return Err(MailError::InvalidRecipient("name must not be empty".into()));
    }
    if !recipient.email.contains('@') {
        return Err(MailError::InvalidRecipient(format!(
            "'{}' is not an email address",
            recipient.email
        )));
    }
    Ok(())
}

fn contains_email(recipients: &[Recipient], email: &str, except: Option<usize>) -> bool {
    recipients
        .iter()
        .enumerate()
        .any(|(i, r)| Some(i) != except && r.email.eq_ignore_ascii_case(email))
}

fn read_recipients(path: &Path) -> MailResult<RecipientList> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let name_col = column(&headers, path, "name")?;
    let email_col = column(&headers, path, "email")?;

    let mut list = RecipientList::default();
    for record in reader.records() {
        let record = record?;
        match (record.get(name_col), record.get(email_col)) {
            (Some(name), Some(email)) if !email.is_empty() => {
                list.recipients.push(Recipient::new(name, email));
            }
            _ => list.skipped += 1,
        }
    }

    if list.skipped > 0 {
        debug!(path = %path.display(), skipped = list.skipped, "Skipped malformed recipient rows");
    }
    Ok(list)
}

fn write_recipients(path: &Path, recipients: &[Recipient]) -> MailResult<()> {
    let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;
    if recipients.is_empty() {
        writer.write_record(["name", "email"])?;
    }
    for recipient in recipients {
        writer.serialize(recipient)?;
    }
    writer.flush()?;
    Ok(())
}

fn column(headers: &StringRecord, path: &Path, name: &'static str) -> MailResult<usize> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or_else(|| MailError::MissingColumn {
            path: path.to_path_buf(),
            column: name,
        })
}
