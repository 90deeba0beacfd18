pub const SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS sensor_samples (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    latitude     REAL    NOT NULL,
    longitude    REAL    NOT NULL,
    recorded_at  INTEGER NOT NULL,
    speed        REAL    NOT NULL,
    accuracy     REAL    NOT NULL,
    accel_x      REAL    NOT NULL,
    accel_y      REAL    NOT NULL,
    accel_z      REAL    NOT NULL,
    road_quality REAL    NOT NULL,
    is_synced    INTEGER NOT NULL DEFAULT 0,
    server_id    INTEGER
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_sensor_samples_unsynced ON sensor_samples (is_synced, id);
"#,
    r#"
CREATE TABLE IF NOT EXISTS warnings (
    server_id     TEXT    PRIMARY KEY,
    latitude      REAL    NOT NULL,
    longitude     REAL    NOT NULL,
    hazard_type   TEXT    NOT NULL,
    severity      INTEGER NOT NULL DEFAULT 0,
    description   TEXT,
    is_verified   INTEGER NOT NULL DEFAULT 0,
    region        TEXT    NOT NULL,
    confirmations INTEGER NOT NULL DEFAULT 1,
    last_updated  INTEGER NOT NULL
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_warnings_position ON warnings (latitude, longitude);
"#,
    r#"
CREATE TABLE IF NOT EXISTS region_sync (
    code          TEXT    PRIMARY KEY,
    name          TEXT    NOT NULL,
    last_sync     INTEGER NOT NULL,
    warning_count INTEGER NOT NULL DEFAULT 0
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS app_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#,
];

pub const INSERT_SENSOR_SAMPLE: &str = r#"
INSERT INTO sensor_samples (
    latitude, longitude, recorded_at, speed, accuracy, accel_x, accel_y, accel_z, road_quality
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);
"#;

pub const SELECT_UNSYNCED_SAMPLES: &str = r#"
SELECT * FROM sensor_samples WHERE is_synced = 0 ORDER BY id;
"#;

pub const COUNT_UNSYNCED_SAMPLES: &str = r#"
SELECT COUNT(*) FROM sensor_samples WHERE is_synced = 0;
"#;

pub const SELECT_SAMPLE: &str = r#"
SELECT * FROM sensor_samples WHERE id = ?1;
"#;

pub const MARK_SAMPLE_SYNCED: &str = r#"
UPDATE sensor_samples
SET is_synced = 1,
    server_id = ?2
WHERE id = ?1 AND is_synced = 0;
"#;

pub const UPSERT_WARNING: &str = r#"
INSERT INTO warnings (
    server_id, latitude, longitude, hazard_type, severity, description,
    is_verified, region, confirmations, last_updated
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT (server_id) DO UPDATE
SET latitude = excluded.latitude,
    longitude = excluded.longitude,
    hazard_type = excluded.hazard_type,
    severity = excluded.severity,
    description = excluded.description,
    is_verified = excluded.is_verified,
    region = excluded.region,
    confirmations = excluded.confirmations,
    last_updated = excluded.last_updated
WHERE excluded.last_updated > warnings.last_updated;
"#;

pub const SELECT_WARNING: &str = r#"
SELECT * FROM warnings WHERE server_id = ?1;
"#;

pub const SELECT_WARNINGS_IN_BOUNDS: &str = r#"
SELECT * FROM warnings
WHERE latitude BETWEEN ?1 AND ?2
  AND longitude BETWEEN ?3 AND ?4;
"#;

pub const COUNT_REGION_WARNINGS: &str = r#"
SELECT COUNT(*) FROM warnings WHERE region = ?1;
"#;

pub const SELECT_REGION_STATUSES: &str = r#"
SELECT code, name, last_sync, warning_count FROM region_sync ORDER BY code;
"#;

pub const UPSERT_REGION_STATUS: &str = r#"
INSERT INTO region_sync (code, name, last_sync, warning_count)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT (code) DO UPDATE
SET name = excluded.name,
    last_sync = excluded.last_sync,
    warning_count = excluded.warning_count;
"#;

pub const SELECT_META: &str = r#"
SELECT value FROM app_meta WHERE key = ?1;
"#;

pub const UPSERT_META: &str = r#"
INSERT INTO app_meta (key, value) VALUES (?1, ?2)
ON CONFLICT (key) DO UPDATE SET value = excluded.value;
"#;

pub const DELETE_SYNCED_SAMPLES_BEFORE: &str = r#"
DELETE FROM sensor_samples WHERE is_synced = 1 AND recorded_at < ?1;
"#;

/// Warnings of downloaded regions are the region cache and only age out once
/// the region itself is no longer tracked.
pub const DELETE_UNTRACKED_WARNINGS_BEFORE: &str = r#"
DELETE FROM warnings
WHERE last_updated < ?1
  AND region NOT IN (SELECT code FROM region_sync);
"#;

pub const REFRESH_REGION_WARNING_COUNTS: &str = r#"
UPDATE region_sync
SET warning_count = (SELECT COUNT(*) FROM warnings WHERE warnings.region = region_sync.code);
"#;
