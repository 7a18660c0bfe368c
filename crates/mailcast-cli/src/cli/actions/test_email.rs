use super::load_config;
use anyhow::{Context, Result};
use mailcast_dispatch::TemplateSettings;
use mailcast_mail::{MailTransport, SmtpMailer};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub config_dir: PathBuf,
    pub to: Option<String>,
    pub template: Option<PathBuf>,
}

/// Sends the current template to a single address.
/// # Errors
/// Returns an error if no template is found or the relay rejects the message.
pub async fn execute(args: Args) -> Result<()> {
    let (_, config) = load_config(&args.config_dir).await?;
    config.require_smtp_credentials()?;

    let to = args.to.unwrap_or_else(|| config.smtp.sender.clone());
    let template = TemplateSettings::from(&config.dispatch)
        .resolve(args.template.as_ref())
        .context("no rendered template available")?;

    info!(
        to = %to,
        template = %template.path.display(),
        subject = %template.subject,
        "Sending test email"
    );

    let mailer = SmtpMailer::from_config(&config.smtp).context("invalid SMTP configuration")?;
    mailer.send_one(&to, &template.subject, &template.html).await.with_context(|| {
        format!(
            "test email to {to} failed; check smtp.* settings (Gmail needs an app password)"
        )
    })?;

    println!("Test email sent to {to}");
    println!("Subject: {}", template.subject);
    println!("Template: {}", template.path.display());
    Ok(())
}
