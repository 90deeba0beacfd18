use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use super::sensor_sample::millis_to_datetime;
use crate::geo::{BoundingBox, Position};

/// Locally cached hazard report. Upserts are keyed by `server_id`, last write wins
/// by `last_updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningRecord {
    #[serde(rename = "id")]
    pub server_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub hazard_type: String,
    #[serde(default)]
    pub severity: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    pub region: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: u32,
    #[serde(rename = "updatedAt")]
    pub last_updated: DateTime<Utc>,
}

fn default_confirmations() -> u32 {
    1
}

impl WarningRecord {
    pub fn position(&self) -> Position {
        Position {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

impl<'r> FromRow<'r, SqliteRow> for WarningRecord {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let updated_ms: i64 = row.try_get("last_updated")?;
        let confirmations: i64 = row.try_get("confirmations")?;
        Ok(Self {
            server_id: row.try_get("server_id")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            hazard_type: row.try_get("hazard_type")?,
            severity: row.try_get("severity")?,
            description: row.try_get("description")?,
            is_verified: row.try_get("is_verified")?,
            region: row.try_get("region")?,
            confirmations: u32::try_from(confirmations.max(1)).unwrap_or(u32::MAX),
            last_updated: millis_to_datetime("last_updated", updated_ms)?,
        })
    }
}

/// Per-region incremental sync bookmark.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSyncStatus {
    pub code: String,
    pub name: String,
    pub last_sync: DateTime<Utc>,
    pub warning_count: i64,
}

impl<'r> FromRow<'r, SqliteRow> for RegionSyncStatus {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let last_sync_ms: i64 = row.try_get("last_sync")?;
        Ok(Self {
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            last_sync: millis_to_datetime("last_sync", last_sync_ms)?,
            warning_count: row.try_get("warning_count")?,
        })
    }
}

/// Entry of the remote region catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionDescriptor {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub country: String,
    pub bounds: BoundingBox,
}
