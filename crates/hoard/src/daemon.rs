//! Daemon mode: run every plan on its schedule until a shutdown signal.

use std::sync::Arc;

use hoard_backup::{BackupRunner, Pipeline, Toolkit};
use hoard_config::{AppConfig, Plan, load_plans};
use hoard_scheduler::{BackupMetrics, JobContext, Scheduler, StatusStore, WebhookNotifier};
use miette::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::checks;

/// Wire the pipeline, status store, notifier and metrics into a scheduler.
pub async fn build_scheduler(
    app: Arc<AppConfig>,
    plans: Vec<Plan>,
) -> Result<(Scheduler, Arc<BackupMetrics>)> {
    let store = StatusStore::open(app.status_store_path())
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    let runner: Arc<dyn BackupRunner> = Arc::new(Pipeline::new(Arc::clone(&app), Toolkit::cli()));
    let metrics = Arc::new(BackupMetrics::new());

    let ctx = JobContext {
        runner,
        store: Arc::new(store),
        notifier: Arc::new(WebhookNotifier::new()),
        metrics: metrics.clone(),
        app,
    };
    Ok((Scheduler::new(ctx, plans), metrics))
}

/// Run the daemon.
pub async fn run(mut app: AppConfig) -> Result<()> {
    info!(config = %app.config_path.display(), "starting hoard daemon");

    let plans = load_plans(&app.config_path).map_err(|e| miette::miette!("{}", e))?;
    checks::run(&plans, &mut app).await?;

    let app = Arc::new(app);
    let (scheduler, metrics) = build_scheduler(Arc::clone(&app), plans).await?;
    scheduler.start().await.map_err(|e| miette::miette!("{}", e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown signals
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await;

    match serde_json::to_string(&metrics.snapshot()) {
        Ok(snapshot) => info!(metrics = %snapshot, "hoard daemon stopped"),
        Err(e) => warn!(error = %e, "hoard daemon stopped, metrics unavailable"),
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c().await.ok();
}
