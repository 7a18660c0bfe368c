#![allow(dead_code)]

use async_trait::async_trait;
use mailcast_config::DispatchConfig;
use mailcast_jobs::WorkerPoolConfig;
use mailcast_mail::{MailError, MailResult, MailTransport};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

mockall::mock! {
    pub Transport {}

    #[async_trait]
    impl MailTransport for Transport {
        async fn send_one(&self, recipient: &str, subject: &str, html: &str) -> MailResult<()>;
    }
}

pub const SUBJECT: &str = "Assemblée générale";

pub fn smtp_error(recipient: &str) -> MailError {
    MailError::Transport {
        recipient: recipient.to_string(),
        message: "421 4.7.0 Try again later".to_string(),
    }
}

/// Writes a `name,email` file with the given rows.
pub fn write_recipients(dir: &Path, rows: &[(&str, &str)]) -> PathBuf {
    let path = dir.join("recipients.csv");
    let mut contents = String::from("name,email\n");
    for (name, email) in rows {
        contents.push_str(&format!("{name},{email}\n"));
    }
    fs::write(&path, contents).unwrap();
    path
}

pub fn members(n: usize) -> Vec<(String, String)> {
    (0..n)
        .map(|i| (format!("Member {i}"), format!("member{i}@example.org")))
        .collect()
}

pub fn write_members(dir: &Path, n: usize) -> PathBuf {
    let rows = members(n);
    let rows: Vec<(&str, &str)> = rows.iter().map(|(n, e)| (n.as_str(), e.as_str())).collect();
    write_recipients(dir, &rows)
}

/// Dispatch settings rooted in `dir`, with a rendered template in `dir/output`.
pub fn dispatch_config(dir: &Path) -> DispatchConfig {
    let output = dir.join("output");
    fs::create_dir_all(&output).unwrap();
    fs::write(
        output.join("email_template_20240101.html"),
        format!("<html><body><div class=\"header\"><h1>{SUBJECT}</h1></div></body></html>"),
    )
    .unwrap();

    DispatchConfig {
        recipients_path: dir.join("recipients.csv"),
        template_dir: output,
        simulate_delay_ms: 0,
        ..DispatchConfig::default()
    }
}

/// A pool that exits after `max_jobs` dequeues.
pub fn pool_config(max_jobs: u64) -> WorkerPoolConfig {
    WorkerPoolConfig {
        concurrency: 2,
        max_jobs,
        rate_limit_per_minute: None,
        job_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(5),
        shutdown_timeout: Duration::from_secs(5),
        heartbeat_interval: Duration::from_secs(30),
        heartbeat_ttl: Duration::from_secs(90),
    }
}
