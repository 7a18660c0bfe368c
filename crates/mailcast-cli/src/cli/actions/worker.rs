use super::{connect_queue, load_config};
use anyhow::{Context, Result};
use mailcast_config::AppConfig;
use mailcast_dispatch::register_handlers;
use mailcast_jobs::{register_metrics, RedisJobQueue, WorkerExit, WorkerPool, WorkerPoolConfig};
use mailcast_mail::{MailTransport, SmtpMailer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct Args {
    pub config_dir: PathBuf,
    pub concurrency: Option<usize>,
}

impl Args {
    fn pool_config(&self, config: &AppConfig) -> WorkerPoolConfig {
        let mut pool = WorkerPoolConfig::from(&config.jobs.worker);
        if let Some(concurrency) = self.concurrency.filter(|&c| c > 0) {
            pool.concurrency = concurrency;
        }
        pool
    }
}

/// Runs worker pools until Ctrl+C or SIGTERM, starting a fresh pool each
/// time one recycles.
/// # Errors
/// Returns an error if the configuration, the relay settings or the job
/// backend are unusable.
pub async fn execute(args: Args) -> Result<()> {
    let (loader, mut config) = load_config(&args.config_dir).await?;
    config.require_smtp_credentials()?;
    register_metrics();

    let queue = connect_queue(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let pool = Arc::new(build_pool(&args, &config, &queue)?);
        let watcher = {
            let pool = Arc::clone(&pool);
            let mut rx = shutdown_rx.clone();
            tokio::spawn(async move {
                if rx.wait_for(|stop| *stop).await.is_ok() {
                    pool.stop();
                }
            })
        };

        let exit = pool.run().await;
        watcher.abort();

        let stats = pool.stats();
        info!(
            worker_id = %stats.id,
            started = stats.jobs_started,
            succeeded = stats.jobs_succeeded,
            failed = stats.jobs_failed,
            "Worker pool stopped"
        );

        match exit.context("worker pool failed")? {
            WorkerExit::Shutdown => break,
            WorkerExit::Recycle => {
                if let Err(e) = loader.reload().await {
                    warn!(error = %e, "Keeping previous configuration");
                }
                config = loader.get().await;
                info!("Starting a fresh worker pool");
            }
        }
    }

    info!("Worker shutdown complete");
    Ok(())
}

fn build_pool(
    args: &Args,
    config: &AppConfig,
    queue: &Arc<RedisJobQueue>,
) -> Result<WorkerPool<RedisJobQueue>> {
    let transport: Arc<dyn MailTransport> =
        Arc::new(SmtpMailer::from_config(&config.smtp).context("invalid SMTP configuration")?);

    let pool = WorkerPool::new(Arc::clone(queue), args.pool_config(config));
    register_handlers(&pool, Arc::clone(queue), transport, config);
    Ok(pool)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
