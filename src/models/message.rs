use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::settings::SettingsUpdate;
use super::warning::{RegionDescriptor, RegionSyncStatus};
use crate::alert::{AlertEffect, AlertSnapshot};
use crate::geo::{BoundingBox, Position};
use crate::sync::SyncStatus;

/// Line-delimited JSON written by the presentation layer on stdin.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Fix(Fix),
    Settings(SettingsUpdate),
    StartTracking,
    StopTracking,
    DownloadRegion {
        code: String,
        name: String,
        bounds: BoundingBox,
    },
    ListRegions,
}

/// Location fix with inertial readings. Numeric fields accept either JSON
/// numbers or numeric strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    #[serde(deserialize_with = "parse_f64")]
    pub latitude: f64,
    #[serde(deserialize_with = "parse_f64")]
    pub longitude: f64,
    /// m/s
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub accuracy: Option<f64>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub accel_x: Option<f64>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub accel_y: Option<f64>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub accel_z: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Fix {
    pub fn position(&self) -> Position {
        Position {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed.unwrap_or(0.0).max(0.0)
    }

    pub fn accel(&self) -> [f64; 3] {
        [
            self.accel_x.unwrap_or(0.0),
            self.accel_y.unwrap_or(0.0),
            self.accel_z.unwrap_or(0.0),
        ]
    }
}

/// Line-delimited JSON written to stdout for the presentation layer.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Effect(AlertEffect),
    Snapshot(AlertSnapshot),
    SyncStatus(SyncStatus),
    Regions {
        available: Vec<RegionDescriptor>,
        downloaded: Vec<RegionSyncStatus>,
    },
    RegionDownloaded {
        code: String,
        ok: bool,
    },
    SettingsRejected {
        reason: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrFloat {
    String(String),
    Float(f64),
}

fn parse_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    parse_f64_option(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing numeric value"))
}

fn parse_f64_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<StringOrFloat> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fix_with_string_numbers() {
        let payload = r#"
        {
            "type": "fix",
            "latitude": "+55.751244",
            "longitude": 37.618423,
            "speed": "13.90",
            "accuracy": "",
            "accelX": 0.12,
            "accelY": "-0.40",
            "accelZ": "9.93",
            "timestamp": "2026-05-02T08:00:00Z"
        }
        "#;

        let msg: InboundMessage = serde_json::from_str(payload).unwrap();
        let InboundMessage::Fix(fix) = msg else {
            panic!("expected a fix");
        };
        assert_eq!(fix.latitude, 55.751244);
        assert_eq!(fix.speed(), 13.9);
        assert_eq!(fix.accuracy, None);
        assert_eq!(fix.accel(), [0.12, -0.40, 9.93]);
        assert!(fix.timestamp.is_some());
    }

    #[test]
    fn parses_control_messages() {
        let msg: InboundMessage = serde_json::from_str(r#"{"type":"stop_tracking"}"#).unwrap();
        assert!(matches!(msg, InboundMessage::StopTracking));

        let msg: InboundMessage = serde_json::from_str(
            r#"{"type":"download_region","code":"RU-SPE","name":"Saint Petersburg",
                "bounds":{"minLat":59.6,"minLon":29.4,"maxLat":60.2,"maxLon":30.8}}"#,
        )
        .unwrap();
        match msg {
            InboundMessage::DownloadRegion { code, bounds, .. } => {
                assert_eq!(code, "RU-SPE");
                assert_eq!(bounds.max_lon, 30.8);
            }
            other => panic!("unexpected {other:?}"),
        }

        let msg: InboundMessage =
            serde_json::from_str(r#"{"type":"settings","volume":0.5}"#).unwrap();
        assert!(matches!(msg, InboundMessage::Settings(s) if s.volume == Some(0.5) && s.min_speed.is_none()));
    }

    #[test]
    fn rejects_fix_without_position() {
        let res = serde_json::from_str::<InboundMessage>(r#"{"type":"fix","longitude":1.0}"#);
        assert!(res.is_err());
    }
}
