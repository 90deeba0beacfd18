use chrono::{DateTime, Utc};
use sqlx::{Executor, Row, Sqlite};
use tracing::{debug, warn};

use super::queries;
use super::DbPool;
use crate::geo::BoundingBox;
use crate::models::sensor_sample::{millis_to_datetime, NewSensorSample, SensorSample};
use crate::models::settings::AlertSettings;
use crate::models::warning::{RegionSyncStatus, WarningRecord};

pub type StoreResult<T> = Result<T, sqlx::Error>;

const META_LAST_SYNC: &str = "last_sync";
const META_ALERT_SETTINGS: &str = "alert_settings";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub samples: u64,
    pub warnings: u64,
}

/// Durable storage shared by the tracker and the sync loop. Each call is its own
/// statement or transaction; there is no row-level locking beyond that.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: DbPool,
}

impl LocalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert_sample(&self, sample: &NewSensorSample) -> StoreResult<i64> {
        let result = sqlx::query(queries::INSERT_SENSOR_SAMPLE)
            .bind(sample.position.latitude)
            .bind(sample.position.longitude)
            .bind(sample.recorded_at.timestamp_millis())
            .bind(sample.speed)
            .bind(sample.accuracy)
            .bind(sample.accel[0])
            .bind(sample.accel[1])
            .bind(sample.accel[2])
            .bind(sample.road_quality)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_sample(&self, id: i64) -> StoreResult<Option<SensorSample>> {
        sqlx::query_as::<_, SensorSample>(queries::SELECT_SAMPLE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn unsynced_samples(&self) -> StoreResult<Vec<SensorSample>> {
        sqlx::query_as::<_, SensorSample>(queries::SELECT_UNSYNCED_SAMPLES)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn count_unsynced(&self) -> StoreResult<i64> {
        let row = sqlx::query(queries::COUNT_UNSYNCED_SAMPLES)
            .fetch_one(&self.pool)
            .await?;
        row.try_get(0)
    }

    /// Marks one uploaded batch as synced in a single transaction. `pairs` holds
    /// `(local id, server id)`. Rows that are already synced keep their server id.
    pub async fn mark_synced(&self, pairs: &[(i64, i64)]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for &(local_id, server_id) in pairs {
            updated += sqlx::query(queries::MARK_SAMPLE_SYNCED)
                .bind(local_id)
                .bind(server_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }

    /// Returns `true` when the row was inserted or overwritten, `false` when the
    /// stored copy is at least as recent.
    pub async fn upsert_warning(&self, warning: &WarningRecord) -> StoreResult<bool> {
        upsert_warning_on(&self.pool, warning).await
    }

    pub async fn get_warning(&self, server_id: &str) -> StoreResult<Option<WarningRecord>> {
        sqlx::query_as::<_, WarningRecord>(queries::SELECT_WARNING)
            .bind(server_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn warnings_in_bounds(&self, bbox: &BoundingBox) -> StoreResult<Vec<WarningRecord>> {
        sqlx::query_as::<_, WarningRecord>(queries::SELECT_WARNINGS_IN_BOUNDS)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lon)
            .bind(bbox.max_lon)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn count_region_warnings(&self, code: &str) -> StoreResult<i64> {
        count_region_warnings_on(&self.pool, code).await
    }

    pub async fn region_statuses(&self) -> StoreResult<Vec<RegionSyncStatus>> {
        sqlx::query_as::<_, RegionSyncStatus>(queries::SELECT_REGION_STATUSES)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn upsert_region_status(&self, status: &RegionSyncStatus) -> StoreResult<()> {
        upsert_region_status_on(&self.pool, status).await
    }

    /// Writes a region download atomically: either every warning and the region
    /// bookmark are stored, or nothing is. Returns the new bookmark and the number
    /// of rows that actually changed.
    pub async fn apply_region_snapshot(
        &self,
        code: &str,
        name: &str,
        warnings: &[WarningRecord],
        watermark: DateTime<Utc>,
    ) -> StoreResult<(RegionSyncStatus, usize)> {
        let mut tx = self.pool.begin().await?;
        let mut applied = 0;
        for warning in warnings {
            if upsert_warning_on(&mut *tx, warning).await? {
                applied += 1;
            }
        }
        let status = RegionSyncStatus {
            code: code.to_string(),
            name: name.to_string(),
            last_sync: watermark,
            warning_count: count_region_warnings_on(&mut *tx, code).await?,
        };
        upsert_region_status_on(&mut *tx, &status).await?;
        tx.commit().await?;
        Ok((status, applied))
    }

    pub async fn last_sync(&self) -> StoreResult<Option<DateTime<Utc>>> {
        match self.meta(META_LAST_SYNC).await? {
            Some(raw) => match raw.parse::<i64>() {
                Ok(ms) => millis_to_datetime(META_LAST_SYNC, ms).map(Some),
                Err(e) => {
                    warn!("Ignoring unreadable last sync marker '{}': {}", raw, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn set_last_sync(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.set_meta(META_LAST_SYNC, &at.timestamp_millis().to_string())
            .await
    }

    /// Last persisted settings. Unreadable payloads are treated as absent.
    pub async fn load_settings(&self) -> StoreResult<Option<AlertSettings>> {
        let Some(raw) = self.meta(META_ALERT_SETTINGS).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<AlertSettings>(&raw) {
            Ok(settings) => Ok(Some(settings)),
            Err(e) => {
                warn!("Discarding unreadable stored alert settings: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn save_settings(&self, settings: &AlertSettings) -> StoreResult<()> {
        let raw = serde_json::to_string(settings).map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
        self.set_meta(META_ALERT_SETTINGS, &raw).await
    }

    /// Retention pass in one transaction: drops synced samples and warnings of
    /// regions that are no longer downloaded when older than `cutoff`, then
    /// recounts every region. Unsynced samples are kept until they are uploaded.
    pub async fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<CleanupReport> {
        let cutoff_ms = cutoff.timestamp_millis();
        let mut tx = self.pool.begin().await?;
        let samples = sqlx::query(queries::DELETE_SYNCED_SAMPLES_BEFORE)
            .bind(cutoff_ms)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let warnings = sqlx::query(queries::DELETE_UNTRACKED_WARNINGS_BEFORE)
            .bind(cutoff_ms)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query(queries::REFRESH_REGION_WARNING_COUNTS)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        debug!("Retention removed {} samples and {} warnings", samples, warnings);
        Ok(CleanupReport { samples, warnings })
    }

    async fn meta(&self, key: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query(queries::SELECT_META)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get("value")).transpose()
    }

    async fn set_meta(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(queries::UPSERT_META)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn upsert_warning_on<'e, E>(executor: E, warning: &WarningRecord) -> StoreResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(queries::UPSERT_WARNING)
        .bind(&warning.server_id)
        .bind(warning.latitude)
        .bind(warning.longitude)
        .bind(&warning.hazard_type)
        .bind(warning.severity)
        .bind(&warning.description)
        .bind(warning.is_verified)
        .bind(&warning.region)
        .bind(i64::from(warning.confirmations.max(1)))
        .bind(warning.last_updated.timestamp_millis())
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn count_region_warnings_on<'e, E>(executor: E, code: &str) -> StoreResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(queries::COUNT_REGION_WARNINGS)
        .bind(code)
        .fetch_one(executor)
        .await?;
    row.try_get(0)
}

async fn upsert_region_status_on<'e, E>(executor: E, status: &RegionSyncStatus) -> StoreResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(queries::UPSERT_REGION_STATUS)
        .bind(&status.code)
        .bind(&status.name)
        .bind(status.last_sync.timestamp_millis())
        .bind(status.warning_count)
        .execute(executor)
        .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::geo::Position;
    use chrono::{Duration, TimeZone};

    pub(crate) fn warning(id: &str, updated: DateTime<Utc>) -> WarningRecord {
        WarningRecord {
            server_id: id.to_string(),
            latitude: 55.75,
            longitude: 37.61,
            hazard_type: "pothole".to_string(),
            severity: 2,
            description: Some("right lane".to_string()),
            is_verified: false,
            region: "RU-MOW".to_string(),
            confirmations: 2,
            last_updated: updated,
        }
    }

    pub(crate) fn sample(at: DateTime<Utc>) -> NewSensorSample {
        NewSensorSample::new(
            Position { latitude: 55.75, longitude: 37.61 },
            at,
            12.5,
            4.0,
            [0.1, -0.2, 9.9],
        )
    }

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn older_warning_upsert_is_a_no_op() {
        let store = LocalStore::new(memory_pool().await);
        assert!(store.upsert_warning(&warning("w1", t(10))).await.unwrap());

        let mut stale = warning("w1", t(9));
        stale.severity = 5;
        stale.hazard_type = "accident".to_string();
        assert!(!store.upsert_warning(&stale).await.unwrap());

        let same_age = warning("w1", t(10));
        assert!(!store.upsert_warning(&same_age).await.unwrap());

        let stored = store.get_warning("w1").await.unwrap().unwrap();
        assert_eq!(stored, warning("w1", t(10)));
    }

    #[tokio::test]
    async fn newer_warning_upsert_overwrites_every_field() {
        let store = LocalStore::new(memory_pool().await);
        store.upsert_warning(&warning("w1", t(10))).await.unwrap();

        let fresh = WarningRecord {
            server_id: "w1".to_string(),
            latitude: 59.93,
            longitude: 30.31,
            hazard_type: "speed_bump".to_string(),
            severity: 1,
            description: None,
            is_verified: true,
            region: "RU-SPE".to_string(),
            confirmations: 7,
            last_updated: t(11),
        };
        assert!(store.upsert_warning(&fresh).await.unwrap());
        assert_eq!(store.get_warning("w1").await.unwrap(), Some(fresh));
    }

    #[tokio::test]
    async fn mark_synced_touches_only_listed_unsynced_rows() {
        let store = LocalStore::new(memory_pool().await);
        let a = store.insert_sample(&sample(t(8))).await.unwrap();
        let b = store.insert_sample(&sample(t(8))).await.unwrap();
        let c = store.insert_sample(&sample(t(8))).await.unwrap();

        assert_eq!(store.mark_synced(&[(a, 100), (c, 102)]).await.unwrap(), 2);
        // A replayed batch must not rewrite server ids.
        assert_eq!(store.mark_synced(&[(a, 999)]).await.unwrap(), 0);

        let unsynced: Vec<i64> = store
            .unsynced_samples()
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(unsynced, vec![b]);

        let synced = store.get_sample(a).await.unwrap().unwrap();
        assert!(synced.is_synced);
        assert_eq!(synced.server_id, Some(100));
        assert_eq!(store.count_unsynced().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn region_snapshot_counts_region_rows() {
        let store = LocalStore::new(memory_pool().await);
        let mut other = warning("w9", t(1));
        other.region = "RU-SPE".to_string();
        store.upsert_warning(&other).await.unwrap();

        let (status, applied) = store
            .apply_region_snapshot(
                "RU-MOW",
                "Moscow",
                &[warning("w1", t(2)), warning("w2", t(3))],
                t(3),
            )
            .await
            .unwrap();
        assert_eq!(applied, 2);
        assert_eq!(status.warning_count, 2);
        assert_eq!(store.region_statuses().await.unwrap(), vec![status]);
    }

    #[tokio::test]
    async fn cleanup_keeps_unsynced_and_recent_rows() {
        let store = LocalStore::new(memory_pool().await);
        let now = t(12);
        let old = now - Duration::days(31);

        let old_synced = store.insert_sample(&sample(old)).await.unwrap();
        let old_unsynced = store.insert_sample(&sample(old)).await.unwrap();
        let recent = store.insert_sample(&sample(now)).await.unwrap();
        store.mark_synced(&[(old_synced, 1), (recent, 2)]).await.unwrap();
        store.upsert_warning(&warning("old", old)).await.unwrap();
        store.upsert_warning(&warning("new", now)).await.unwrap();

        let report = store
            .cleanup_older_than(now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(report, CleanupReport { samples: 1, warnings: 1 });
        assert!(store.get_sample(old_synced).await.unwrap().is_none());
        assert!(store.get_sample(old_unsynced).await.unwrap().is_some());
        assert!(store.get_sample(recent).await.unwrap().is_some());
        assert!(store.get_warning("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_keeps_downloaded_region_cache_and_recounts() {
        let store = LocalStore::new(memory_pool().await);
        let now = t(12);
        let old = now - Duration::days(40);

        store
            .apply_region_snapshot(
                "RU-MOW",
                "Moscow",
                &[warning("w1", old), warning("w2", now)],
                now,
            )
            .await
            .unwrap();
        // Arrives outside a snapshot, so the stored count is behind.
        store.upsert_warning(&warning("w3", now)).await.unwrap();
        let mut orphan = warning("w9", old);
        orphan.region = "RU-SPE".to_string();
        store.upsert_warning(&orphan).await.unwrap();

        let report = store
            .cleanup_older_than(now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(report.warnings, 1);
        assert!(store.get_warning("w1").await.unwrap().is_some());
        assert!(store.get_warning("w9").await.unwrap().is_none());

        let statuses = store.region_statuses().await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].warning_count, 3);
        assert_eq!(statuses[0].warning_count, store.count_region_warnings("RU-MOW").await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_settings_read_as_absent() {
        let store = LocalStore::new(memory_pool().await);
        assert_eq!(store.load_settings().await.unwrap(), None);
        store.set_meta(META_ALERT_SETTINGS, "{not json").await.unwrap();
        assert_eq!(store.load_settings().await.unwrap(), None);

        let custom = AlertSettings {
            volume: 0.3,
            ..AlertSettings::default()
        };
        store.save_settings(&custom).await.unwrap();
        assert_eq!(store.load_settings().await.unwrap(), Some(custom));
    }
}
