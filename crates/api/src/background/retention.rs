//! Periodic cleanup of expired uploads, results and finished jobs.
//!
//! The first tick fires immediately, so a sweep also runs at startup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use swimlens_worker::retention::{sweep_expired, SweepReport};
use swimlens_worker::Orchestrator;
use tokio_util::sync::CancellationToken;

/// What to clean and how often.
#[derive(Debug, Clone)]
pub struct RetentionSettings {
    pub dirs: Vec<PathBuf>,
    pub ttl: Duration,
    pub interval: Duration,
}

/// Run one cleanup pass: expired files, finished jobs older than the TTL,
/// and rate limiter clients idle for a full window.
pub async fn sweep_once(settings: &RetentionSettings, orchestrator: &Orchestrator) -> SweepReport {
    let report = sweep_expired(&settings.dirs, settings.ttl, SystemTime::now()).await;

    let pruned_jobs = match chrono::Duration::from_std(settings.ttl) {
        Ok(ttl) => orchestrator.store().prune_finished(Utc::now() - ttl).await,
        Err(_) => 0,
    };
    let pruned_clients = orchestrator
        .limiter()
        .prune_idle(tokio::time::Instant::now())
        .await;

    if report.deleted > 0 || report.failed > 0 || pruned_jobs > 0 {
        tracing::info!(
            scanned = report.scanned,
            deleted = report.deleted,
            failed = report.failed,
            pruned_jobs,
            pruned_clients,
            "Retention: sweep finished",
        );
    } else {
        tracing::debug!(scanned = report.scanned, pruned_clients, "Retention: nothing to purge");
    }
    report
}

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    settings: RetentionSettings,
    orchestrator: Arc<Orchestrator>,
    cancel: CancellationToken,
) {
    tracing::info!(
        ttl_secs = settings.ttl.as_secs(),
        interval_secs = settings.interval.as_secs(),
        "Retention job started"
    );

    let mut interval = tokio::time::interval(settings.interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Retention job stopping");
                break;
            }
            _ = interval.tick() => {
                sweep_once(&settings, &orchestrator).await;
            }
        }
    }
}
