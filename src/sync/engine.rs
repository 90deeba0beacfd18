use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::SyncStatus;
use crate::db::LocalStore;
use crate::gateway::RemoteGateway;
use crate::geo::BoundingBox;
use crate::models::sensor_sample::SampleUpload;
use crate::models::warning::RegionDescriptor;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    pub batches_sent: usize,
    pub batches_failed: usize,
    pub samples_synced: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    pub regions_updated: usize,
    pub regions_failed: usize,
    pub warnings_applied: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No connectivity; nothing was touched.
    Skipped,
    /// The cycle ran. A `None` step failed as a whole and was logged.
    Completed {
        upload: Option<UploadReport>,
        download: Option<DownloadReport>,
    },
}

/// Keeps the local store and the remote service consistent under intermittent
/// connectivity. Failed units are left for the next tick.
pub struct SyncEngine<G> {
    store: LocalStore,
    gateway: Arc<G>,
    batch_size: usize,
    retention: chrono::Duration,
    status: watch::Sender<SyncStatus>,
}

impl<G: RemoteGateway> SyncEngine<G> {
    pub fn new(store: LocalStore, gateway: Arc<G>, batch_size: usize, retention_days: i64) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            store,
            gateway,
            batch_size: batch_size.max(1),
            retention: chrono::Duration::days(retention_days),
            status,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Runs `tick` every `period` until the task is aborted. A slow cycle delays
    /// only this loop.
    pub async fn run(self: Arc<Self>, period: Duration) {
        if let Ok(Some(last)) = self.store.last_sync().await {
            self.status.send_modify(|s| s.last_sync = Some(last));
        }

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match self.tick().await {
                SyncOutcome::Skipped => debug!("Sync tick skipped (offline)"),
                SyncOutcome::Completed { upload, download } => {
                    info!("Sync cycle finished: upload={:?} download={:?}", upload, download)
                }
            }
        }
    }

    /// One full cycle: upload, download, last-sync marker, retention. Skipped
    /// entirely while offline.
    pub async fn tick(&self) -> SyncOutcome {
        if !self.gateway.is_online().await {
            self.status.send_modify(|s| {
                s.online = false;
                s.syncing = false;
            });
            return SyncOutcome::Skipped;
        }
        self.status.send_modify(|s| {
            s.online = true;
            s.syncing = true;
        });

        let upload = match self.upload_pending().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Upload step failed: {:#}", e);
                None
            }
        };

        let download = match self.download_updates().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Download step failed: {:#}", e);
                None
            }
        };

        let now = Utc::now();
        let last_sync = match self.store.set_last_sync(now).await {
            Ok(()) => Some(now),
            Err(e) => {
                error!("Failed to record last sync time: {}", e);
                None
            }
        };

        match self.store.cleanup_older_than(now - self.retention).await {
            Ok(report) => debug!("Retention cleanup: {:?}", report),
            Err(e) => error!("Retention cleanup failed: {}", e),
        }

        let pending = self.store.count_unsynced().await.ok();
        self.status.send_modify(|s| {
            s.syncing = false;
            if last_sync.is_some() {
                s.last_sync = last_sync;
            }
            if let Some(pending) = pending {
                s.pending_uploads = pending;
            }
        });

        SyncOutcome::Completed { upload, download }
    }

    /// Uploads unsynced samples in batches. A failed batch stays unsynced and the
    /// remaining batches still go out.
    pub async fn upload_pending(&self) -> anyhow::Result<UploadReport> {
        let samples = self.store.unsynced_samples().await?;
        let mut report = UploadReport::default();

        for batch in samples.chunks(self.batch_size) {
            let payload: Vec<SampleUpload> = batch.iter().map(SampleUpload::from).collect();
            let first_id = batch[0].id;

            let server_ids = match self.gateway.upload_batch(&payload).await {
                Ok(ids) if ids.len() == batch.len() => ids,
                Ok(ids) => {
                    warn!(
                        "Batch starting at sample {} got {} ids for {} rows, leaving it unsynced",
                        first_id,
                        ids.len(),
                        batch.len()
                    );
                    report.batches_failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Upload of batch starting at sample {} failed: {}", first_id, e);
                    report.batches_failed += 1;
                    continue;
                }
            };

            let pairs: Vec<(i64, i64)> = batch.iter().map(|s| s.id).zip(server_ids).collect();
            match self.store.mark_synced(&pairs).await {
                Ok(updated) => {
                    report.batches_sent += 1;
                    report.samples_synced += updated;
                }
                Err(e) => {
                    error!("Failed to mark batch starting at sample {} as synced: {}", first_id, e);
                    report.batches_failed += 1;
                }
            }
        }

        if !samples.is_empty() {
            info!(
                "Uploaded {} of {} pending samples ({} batches failed)",
                report.samples_synced,
                samples.len(),
                report.batches_failed
            );
        }
        Ok(report)
    }

    /// Pulls warnings changed since each downloaded region's watermark.
    pub async fn download_updates(&self) -> anyhow::Result<DownloadReport> {
        let regions = self.store.region_statuses().await?;
        let mut report = DownloadReport::default();

        // Fetch concurrently, apply one region at a time.
        let fetches = regions
            .iter()
            .map(|region| self.gateway.fetch_region_updates(&region.code, region.last_sync));
        let results = join_all(fetches).await;

        for (region, result) in regions.into_iter().zip(results) {
            let warnings = match result {
                Ok(warnings) => warnings,
                Err(e) => {
                    warn!("Update download for region {} failed: {}", region.code, e);
                    report.regions_failed += 1;
                    continue;
                }
            };
            if warnings.is_empty() {
                continue;
            }

            let watermark = newest(&warnings).map_or(region.last_sync, |t| t.max(region.last_sync));
            match self
                .store
                .apply_region_snapshot(&region.code, &region.name, &warnings, watermark)
                .await
            {
                Ok((status, applied)) => {
                    debug!(
                        "Region {}: {} of {} warnings applied, {} cached",
                        status.code,
                        applied,
                        warnings.len(),
                        status.warning_count
                    );
                    report.regions_updated += 1;
                    report.warnings_applied += applied;
                }
                Err(e) => {
                    error!("Failed to store updates for region {}: {}", region.code, e);
                    report.regions_failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Full download of a newly selected region. Returns `false` on any failure,
    /// in which case nothing was written.
    pub async fn download_region(&self, code: &str, name: &str, bounds: BoundingBox) -> bool {
        let warnings = match self.gateway.fetch_region_full(code, &bounds).await {
            Ok(warnings) => warnings,
            Err(e) => {
                warn!("Full download of region {} failed: {}", code, e);
                return false;
            }
        };

        let watermark = newest(&warnings).unwrap_or_else(|| to_millis(Utc::now()));
        match self
            .store
            .apply_region_snapshot(code, name, &warnings, watermark)
            .await
        {
            Ok((status, _)) => {
                info!(
                    "Downloaded region {} ({}): {} warnings cached",
                    code, name, status.warning_count
                );
                true
            }
            Err(e) => {
                error!("Failed to store region {}: {}", code, e);
                false
            }
        }
    }

    /// Remote region catalog. Empty while offline, which means "unknown", not
    /// "no regions".
    pub async fn available_regions(&self) -> Vec<RegionDescriptor> {
        if !self.gateway.is_online().await {
            return Vec::new();
        }
        match self.gateway.fetch_regions().await {
            Ok(regions) => regions,
            Err(e) => {
                warn!("Region catalog request failed: {}", e);
                Vec::new()
            }
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }
}

fn newest(warnings: &[crate::models::warning::WarningRecord]) -> Option<DateTime<Utc>> {
    warnings.iter().map(|w| w.last_updated).max().map(to_millis)
}

/// Watermarks are stored in milliseconds; truncating here keeps the next
/// `since` identical to what was persisted.
fn to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}
