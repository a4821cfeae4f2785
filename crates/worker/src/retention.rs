//! Age-based cleanup of upload and result files.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Default age after which uploads and results are deleted.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Delete regular files in `dirs` whose modification time is older than
/// `ttl` relative to `now`. Per-file failures are logged and counted; a
/// missing directory is skipped.
pub async fn sweep_expired(dirs: &[PathBuf], ttl: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();
    let Some(cutoff) = now.checked_sub(ttl) else {
        return report;
    };

    for dir in dirs {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Retention: skipping directory");
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Retention: directory scan aborted");
                    report.failed += 1;
                    break;
                }
            };
            let path = entry.path();

            let modified = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta.modified(),
                Ok(_) => continue,
                Err(e) => Err(e),
            };
            report.scanned += 1;

            let expired = match modified {
                Ok(modified) => modified < cutoff,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Retention: cannot read mtime");
                    report.failed += 1;
                    continue;
                }
            };
            if !expired {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Retention: deleted expired file");
                    report.deleted += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Retention: delete failed");
                    report.failed += 1;
                }
            }
        }
    }

    report
}
