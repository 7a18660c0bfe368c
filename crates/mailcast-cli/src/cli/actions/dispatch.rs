use super::{confirm, connect_queue, load_config};
use anyhow::{Context, Result};
use mailcast_config::DispatchConfig;
use mailcast_dispatch::{DispatchMode, DispatchRequest, Dispatcher};
use mailcast_mail::{NullTransport, SmtpMailer};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub config_dir: PathBuf,
    pub mode: DispatchMode,
    pub delay_secs: Option<u64>,
    pub limit: Option<usize>,
    pub simulate: bool,
    pub recipients: Option<PathBuf>,
    pub template: Option<PathBuf>,
    pub assume_yes: bool,
}

impl Args {
    fn request(&self, config: &DispatchConfig) -> DispatchRequest {
        let mut request = DispatchRequest::from_config(config);
        if let Some(secs) = self.delay_secs {
            request.delay_secs = secs;
        }
        request.recipients_path.clone_from(&self.recipients);
        request.template_path.clone_from(&self.template);
        request.simulate = self.simulate;
        request.limit = self.limit;
        request
    }
}

/// Runs a dispatch in the requested mode.
/// # Errors
/// Returns an error if the backend, the relay or the input files are unusable.
pub async fn execute(args: Args) -> Result<()> {
    let (_, config) = load_config(&args.config_dir).await?;
    let request = args.request(&config.dispatch);
    let dispatcher = Dispatcher::new(config.dispatch.clone());

    info!(
        mode = %args.mode,
        delay_secs = request.delay_secs,
        limit = ?request.limit,
        simulate = request.simulate,
        "Dispatch requested"
    );

    match args.mode {
        DispatchMode::Async => {
            let queue = connect_queue(&config).await?;
            let submission = dispatcher
                .submit_async(queue.as_ref(), &request)
                .await
                .context("failed to submit the bulk dispatch")?;

            if submission.live_workers == 0 {
                println!("No worker is running; start one with `mailcast worker`.");
            }
            println!("Bulk dispatch submitted: {}", submission.job_id);
            println!("Follow its progress with:");
            println!("  mailcast status {} --bulk", submission.job_id);
            println!("List active jobs with:");
            println!("  mailcast status --list");
        }
        DispatchMode::Sync => {
            let report = if request.simulate {
                dispatcher.run_sync(&NullTransport, &request).await?
            } else {
                config.require_smtp_credentials()?;
                if !args.assume_yes
                    && !confirm("Sending blocks this terminal until the last message. Continue?")?
                {
                    println!("Dispatch cancelled.");
                    return Ok(());
                }
                let mailer = SmtpMailer::from_config(&config.smtp)
                    .context("invalid SMTP configuration")?;
                dispatcher.run_sync(&mailer, &request).await?
            };

            println!("{} emails sent.", report.sent);
            if report.skipped_rows > 0 {
                println!("{} malformed rows skipped.", report.skipped_rows);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            config_dir: PathBuf::from("config"),
            mode: DispatchMode::Async,
            delay_secs: None,
            limit: None,
            simulate: false,
            recipients: None,
            template: None,
            assume_yes: false,
        }
    }

    #[test]
    fn test_request_falls_back_to_configured_delay() {
        let config = DispatchConfig::default();
        let request = args().request(&config);
        assert_eq!(request.delay_secs, config.default_delay_secs);
        assert!(request.recipients_path.is_none());
    }

    #[test]
    fn test_request_overrides() {
        let request = Args {
            delay_secs: Some(0),
            limit: Some(3),
            simulate: true,
            template: Some(PathBuf::from("output/custom.html")),
            ..args()
        }
        .request(&DispatchConfig::default());

        assert_eq!(request.delay_secs, 0);
        assert_eq!(request.limit, Some(3));
        assert!(request.simulate);
        assert_eq!(
            request.template_path,
            Some(PathBuf::from("output/custom.html"))
        );
    }
}
