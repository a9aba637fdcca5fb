//! Age-based cleanup of orphaned staging artifacts.
//!
//! A staging artifact whose upload never received its last chunk stays on
//! disk forever otherwise. The janitor runs on its own task, away from the
//! request path, and only touches `tmp_*` files in the staging directory.

use crate::services::chunk_receiver::STAGING_PREFIX;
use chrono::{DateTime, TimeDelta, Utc};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{fs, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Artifacts older than the TTL that were deleted.
    pub removed: usize,
    /// Artifacts still within the TTL.
    pub retained: usize,
    /// Expired artifacts that could not be inspected or deleted.
    pub failed: usize,
}

/// Delete staging artifacts last modified more than `ttl` before `now`.
///
/// A missing staging directory is an empty sweep. Per-file failures are
/// counted and logged, never returned.
pub async fn sweep_staging(
    staging_dir: &Path,
    ttl: Duration,
    now: DateTime<Utc>,
) -> io::Result<SweepReport> {
    let mut report = SweepReport::default();
    let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);

    let mut entries = match fs::read_dir(staging_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(report),
        Err(err) => return Err(err),
    };

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(STAGING_PREFIX) {
            continue;
        }
        let path = entry.path();

        let modified = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(err) => {
                debug!("cannot stat staging artifact {}: {}", path.display(), err);
                report.failed += 1;
                continue;
            }
        };

        if now.signed_duration_since(modified) <= ttl {
            report.retained += 1;
            continue;
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("removed expired staging artifact {}", path.display());
                report.removed += 1;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!("failed to remove staging artifact {}: {}", path.display(), err);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Spawn the periodic sweeper. A zero TTL or interval disables it.
pub fn spawn_janitor(
    staging_dir: PathBuf,
    ttl: Duration,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    if ttl.is_zero() || interval.is_zero() {
        info!("staging janitor disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep_staging(&staging_dir, ttl, Utc::now()).await {
                Ok(report) if report.removed > 0 || report.failed > 0 => info!(
                    removed = report.removed,
                    retained = report.retained,
                    failed = report.failed,
                    "staging sweep finished"
                ),
                Ok(report) => debug!(retained = report.retained, "staging sweep finished"),
                Err(err) => warn!(
                    "staging sweep of {} failed: {}",
                    staging_dir.display(),
                    err
                ),
            }
        }
    }))
}
