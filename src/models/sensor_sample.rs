use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::geo::Position;

const STANDARD_GRAVITY: f64 = 9.80665;

/// One point of trip telemetry as it is persisted locally.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSample {
    pub id: i64,
    pub position: Position,
    pub recorded_at: DateTime<Utc>,
    pub speed: f64,
    pub accuracy: f64,
    pub accel: [f64; 3],
    pub road_quality: f64,
    pub is_synced: bool,
    pub server_id: Option<i64>,
}

/// A sample that has not been written to the store yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSensorSample {
    pub position: Position,
    pub recorded_at: DateTime<Utc>,
    pub speed: f64,
    pub accuracy: f64,
    pub accel: [f64; 3],
    pub road_quality: f64,
}

impl NewSensorSample {
    pub fn new(
        position: Position,
        recorded_at: DateTime<Utc>,
        speed: f64,
        accuracy: f64,
        accel: [f64; 3],
    ) -> Self {
        Self {
            position,
            recorded_at,
            speed,
            accuracy,
            accel,
            road_quality: road_quality_score(accel),
        }
    }
}

/// Deviation of the acceleration vector from resting gravity, in m/s².
/// Zero on a perfectly smooth road.
pub fn road_quality_score(accel: [f64; 3]) -> f64 {
    let [x, y, z] = accel;
    (x * x + y * y + (z - STANDARD_GRAVITY).powi(2)).sqrt()
}

impl<'r> FromRow<'r, SqliteRow> for SensorSample {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let recorded_ms: i64 = row.try_get("recorded_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            position: Position {
                latitude: row.try_get("latitude")?,
                longitude: row.try_get("longitude")?,
            },
            recorded_at: millis_to_datetime("recorded_at", recorded_ms)?,
            speed: row.try_get("speed")?,
            accuracy: row.try_get("accuracy")?,
            accel: [
                row.try_get("accel_x")?,
                row.try_get("accel_y")?,
                row.try_get("accel_z")?,
            ],
            road_quality: row.try_get("road_quality")?,
            is_synced: row.try_get("is_synced")?,
            server_id: row.try_get("server_id")?,
        })
    }
}

pub(crate) fn millis_to_datetime(column: &str, ms: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("timestamp {ms} out of range").into(),
    })
}

/// Wire shape of one uploaded sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleUpload {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub speed: f64,
    pub accuracy: f64,
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    pub road_quality: f64,
}

impl From<&SensorSample> for SampleUpload {
    fn from(s: &SensorSample) -> Self {
        Self {
            latitude: s.position.latitude,
            longitude: s.position.longitude,
            timestamp: s.recorded_at,
            speed: s.speed,
            accuracy: s.accuracy,
            accel_x: s.accel[0],
            accel_y: s.accel[1],
            accel_z: s.accel[2],
            road_quality: s.road_quality,
        }
    }
}
