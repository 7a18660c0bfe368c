//! Rendered template loading and subject extraction.

use crate::error::{MailError, MailResult};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;
use tracing::debug;

/// A rendered HTML template and the subject derived from it.
#[derive(Debug, Clone)]
pub struct LoadedTemplate {
    /// File the HTML was read from.
    pub path: PathBuf,
    /// Full HTML document.
    pub html: String,
    /// Subject line.
    pub subject: String,
}

impl LoadedTemplate {
    /// Loads the most recently modified `{prefix}*.html` file in `dir`.
    pub fn load_latest(dir: &Path, prefix: &str, fallback_subject: &str) -> MailResult<Self> {
        let path = latest_template(dir, prefix)?;
        Self::load(&path, fallback_subject)
    }

    /// Loads a specific template file.
    pub fn load(path: &Path, fallback_subject: &str) -> MailResult<Self> {
        let html = fs::read_to_string(path)?;
        let subject = extract_subject(&html).unwrap_or_else(|| fallback_subject.to_string());
        debug!(path = %path.display(), subject = %subject, "Loaded template");

        Ok(Self {
            path: path.to_path_buf(),
            html,
            subject,
        })
    }
}

/// Returns the newest template file by modification time.
pub fn latest_template(dir: &Path, prefix: &str) -> MailResult<PathBuf> {
    let not_found = || MailError::TemplateNotFound {
        dir: dir.to_path_buf(),
        prefix: prefix.to_string(),
    };

    if !dir.is_dir() {
        return Err(not_found());
    }

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(prefix) || !name.ends_with(".html") {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }

    newest.map(|(_, path)| path).ok_or_else(not_found)
}

/// Extracts a subject: the `<h1>` of the `.header` element, else `<title>`.
pub fn extract_subject(html: &str) -> Option<String> {
    [&*HEADER_H1, &*TITLE]
        .into_iter()
        .filter_map(|re| re.captures(html))
        .filter_map(|caps| caps.get(1).map(|m| normalize_text(m.as_str())))
        .find(|text| !text.is_empty())
}

static HEADER_H1: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<[a-z][a-z0-9]*\s[^>]*class\s*=\s*["'](?:[^"']*\s)?header(?:\s[^"']*)?["'][^>]*>.*?<h1[^>]*>(.*?)</h1>"#,
    )
    .expect("header regex is valid")
});

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex is valid"));

static TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"));

/// Strips inline tags, decodes common entities and collapses whitespace.
fn normalize_text(fragment: &str) -> String {
    let text = TAGS.replace_all(fragment, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const FALLBACK: &str = "Association Gamadji - Informations";

    #[test]
    fn test_subject_from_header_h1() {
        let html = r#"<html><head><title>Page</title></head><body>
            <h1>Outside</h1>
            <div class="header">
              <img src="logo.png">
              <h1>  Assemblée <em>générale</em> &amp; repas </h1>
            </div></body></html>"#;
        assert_eq!(
            extract_subject(html).as_deref(),
            Some("Assemblée générale & repas")
        );
    }

    #[test]
    fn test_subject_falls_back_to_title() {
        let html = r#"<html><head><title>Nouvelles du mois</title></head>
            <body><div class="email-header"><h1>Ignored</h1></div></body></html>"#;
        assert_eq!(extract_subject(html).as_deref(), Some("Nouvelles du mois"));
    }

    #[test]
    fn test_no_subject() {
        assert_eq!(extract_subject("<p>nothing</p>"), None);
        assert_eq!(extract_subject("<title>   </title>"), None);
    }

    #[test]
    fn test_load_uses_fallback_subject() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("email_template_1.html");
        fs::write(&path, "<p>Bonjour</p>").unwrap();

        let template = LoadedTemplate::load(&path, FALLBACK).unwrap();
        assert_eq!(template.subject, FALLBACK);
        assert_eq!(template.html, "<p>Bonjour</p>");
    }

    #[test]
    fn test_latest_template_by_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("email_template_b.html");
        let newer = dir.path().join("email_template_a.html");
        fs::write(&older, "<title>Old</title>").unwrap();
        fs::write(&newer, "<title>New</title>").unwrap();
        fs::write(dir.path().join("notes.html"), "<title>Other</title>").unwrap();

        let past = SystemTime::now() - Duration::from_secs(3600);
        fs::File::options()
            .write(true)
            .open(&older)
            .unwrap()
            .set_modified(past)
            .unwrap();

        let template = LoadedTemplate::load_latest(dir.path(), "email_template_", FALLBACK).unwrap();
        assert_eq!(template.path, newer);
        assert_eq!(template.subject, "New");
    }

    #[test]
    fn test_missing_template_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = latest_template(&dir.path().join("output"), "email_template_");
        assert!(matches!(result, Err(MailError::TemplateNotFound { .. })));
    }
}
