use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

pub const MIN_DISTANCE_RANGE: RangeInclusive<f64> = 10.0..=100.0;
pub const MAX_DISTANCE_RANGE: RangeInclusive<f64> = 100.0..=1000.0;
pub const MIN_SPEED_RANGE: RangeInclusive<f64> = 0.0..=20.0;
pub const BEEP_START_DISTANCE_RANGE: RangeInclusive<f64> = 50.0..=500.0;
pub const BEEP_INTERVAL_FAR_RANGE: RangeInclusive<u32> = 1000..=5000;
pub const BEEP_INTERVAL_NEAR_RANGE: RangeInclusive<u32> = 100..=2000;
pub const VOLUME_RANGE: RangeInclusive<f64> = 0.0..=1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ru,
    En,
}

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("minDistance ({min}) must be below maxDistance ({max})")]
    DistanceWindow { min: f64, max: f64 },
    #[error("beepIntervalAtNear ({near}) must be below beepIntervalAtFar ({far})")]
    BeepCadence { near: u32, far: u32 },
    #[error("beepStartDistance ({start}) must lie within {min}..={max}")]
    BeepStart { start: f64, min: f64, max: f64 },
}

/// User-tunable alert thresholds. Distances in meters, speed in m/s, intervals in ms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertSettings {
    pub voice_enabled: bool,
    pub beep_enabled: bool,
    pub volume: f64,
    pub language: Language,
    pub min_distance: f64,
    pub max_distance: f64,
    pub min_speed: f64,
    pub beep_start_distance: f64,
    pub beep_interval_at_far: u32,
    pub beep_interval_at_near: u32,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            voice_enabled: true,
            beep_enabled: true,
            volume: 0.8,
            language: Language::Ru,
            min_distance: 20.0,
            max_distance: 500.0,
            min_speed: 5.0,
            beep_start_distance: 200.0,
            beep_interval_at_far: 2000,
            beep_interval_at_near: 300,
        }
    }
}

/// Partial settings pushed by the UI. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub voice_enabled: Option<bool>,
    pub beep_enabled: Option<bool>,
    pub volume: Option<f64>,
    pub language: Option<Language>,
    pub min_distance: Option<f64>,
    pub max_distance: Option<f64>,
    pub min_speed: Option<f64>,
    pub beep_start_distance: Option<f64>,
    pub beep_interval_at_far: Option<u32>,
    pub beep_interval_at_near: Option<u32>,
}

impl SettingsUpdate {
    pub fn apply_to(&self, current: &AlertSettings) -> AlertSettings {
        AlertSettings {
            voice_enabled: self.voice_enabled.unwrap_or(current.voice_enabled),
            beep_enabled: self.beep_enabled.unwrap_or(current.beep_enabled),
            volume: self.volume.unwrap_or(current.volume),
            language: self.language.unwrap_or(current.language),
            min_distance: self.min_distance.unwrap_or(current.min_distance),
            max_distance: self.max_distance.unwrap_or(current.max_distance),
            min_speed: self.min_speed.unwrap_or(current.min_speed),
            beep_start_distance: self.beep_start_distance.unwrap_or(current.beep_start_distance),
            beep_interval_at_far: self.beep_interval_at_far.unwrap_or(current.beep_interval_at_far),
            beep_interval_at_near: self
                .beep_interval_at_near
                .unwrap_or(current.beep_interval_at_near),
        }
    }
}

fn check(field: &'static str, value: f64, range: &RangeInclusive<f64>) -> Result<(), SettingsError> {
    if value.is_finite() && range.contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

fn clamp_u32(value: u32, range: &RangeInclusive<u32>) -> u32 {
    value.clamp(*range.start(), *range.end())
}

fn clamp_f64(value: f64, range: &RangeInclusive<f64>) -> f64 {
    if value.is_nan() {
        *range.start()
    } else {
        value.clamp(*range.start(), *range.end())
    }
}

impl AlertSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        check("volume", self.volume, &VOLUME_RANGE)?;
        check("minDistance", self.min_distance, &MIN_DISTANCE_RANGE)?;
        check("maxDistance", self.max_distance, &MAX_DISTANCE_RANGE)?;
        check("minSpeed", self.min_speed, &MIN_SPEED_RANGE)?;
        check("beepStartDistance", self.beep_start_distance, &BEEP_START_DISTANCE_RANGE)?;
        check(
            "beepIntervalAtFar",
            self.beep_interval_at_far as f64,
            &(*BEEP_INTERVAL_FAR_RANGE.start() as f64..=*BEEP_INTERVAL_FAR_RANGE.end() as f64),
        )?;
        check(
            "beepIntervalAtNear",
            self.beep_interval_at_near as f64,
            &(*BEEP_INTERVAL_NEAR_RANGE.start() as f64..=*BEEP_INTERVAL_NEAR_RANGE.end() as f64),
        )?;

        if self.min_distance >= self.max_distance {
            return Err(SettingsError::DistanceWindow {
                min: self.min_distance,
                max: self.max_distance,
            });
        }
        if self.beep_interval_at_near >= self.beep_interval_at_far {
            return Err(SettingsError::BeepCadence {
                near: self.beep_interval_at_near,
                far: self.beep_interval_at_far,
            });
        }
        if self.beep_start_distance < self.min_distance
            || self.beep_start_distance > self.max_distance
        {
            return Err(SettingsError::BeepStart {
                start: self.beep_start_distance,
                min: self.min_distance,
                max: self.max_distance,
            });
        }
        Ok(())
    }

    /// Forces every field into its slider range and restores the cross-field
    /// invariants. The result always passes `validate`.
    pub fn clamped(&self) -> Self {
        let min_distance = clamp_f64(self.min_distance, &MIN_DISTANCE_RANGE);
        // Slider ranges meet at 100 m, so an equal pair needs nudging apart.
        let mut max_distance = clamp_f64(self.max_distance, &MAX_DISTANCE_RANGE);
        if max_distance <= min_distance {
            max_distance = min_distance + 1.0;
        }
        let beep_start_distance = clamp_f64(self.beep_start_distance, &BEEP_START_DISTANCE_RANGE)
            .clamp(min_distance, max_distance);
        let beep_interval_at_far = clamp_u32(self.beep_interval_at_far, &BEEP_INTERVAL_FAR_RANGE);
        let mut beep_interval_at_near = clamp_u32(self.beep_interval_at_near, &BEEP_INTERVAL_NEAR_RANGE);
        if beep_interval_at_near >= beep_interval_at_far {
            beep_interval_at_near = beep_interval_at_far - 1;
        }

        Self {
            voice_enabled: self.voice_enabled,
            beep_enabled: self.beep_enabled,
            volume: clamp_f64(self.volume, &VOLUME_RANGE),
            language: self.language,
            min_distance,
            max_distance,
            min_speed: clamp_f64(self.min_speed, &MIN_SPEED_RANGE),
            beep_start_distance,
            beep_interval_at_far,
            beep_interval_at_near,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_keeps_unspecified_fields() {
        let current = AlertSettings {
            volume: 0.3,
            min_speed: 12.0,
            language: Language::En,
            ..AlertSettings::default()
        };
        let update: SettingsUpdate = serde_json::from_str(r#"{"beepStartDistance":150}"#).unwrap();

        let merged = update.apply_to(&current);
        assert_eq!(
            merged,
            AlertSettings {
                beep_start_distance: 150.0,
                ..current
            }
        );
        assert_eq!(SettingsUpdate::default().apply_to(&merged), merged);
    }

    #[test]
    fn defaults_are_valid() {
        assert_eq!(AlertSettings::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_inverted_window_and_cadence() {
        let s = AlertSettings {
            min_distance: 100.0,
            max_distance: 100.0,
            ..AlertSettings::default()
        };
        assert!(matches!(s.validate(), Err(SettingsError::DistanceWindow { .. })));

        let s = AlertSettings {
            beep_interval_at_far: 1500,
            beep_interval_at_near: 1500,
            ..AlertSettings::default()
        };
        assert!(matches!(s.validate(), Err(SettingsError::BeepCadence { .. })));
    }

    #[test]
    fn rejects_out_of_range_slider_values() {
        let s = AlertSettings {
            volume: 1.5,
            ..AlertSettings::default()
        };
        assert!(matches!(
            s.validate(),
            Err(SettingsError::OutOfRange { field: "volume", .. })
        ));

        let s = AlertSettings {
            beep_start_distance: 600.0,
            ..AlertSettings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn clamped_settings_always_validate() {
        let wild = AlertSettings {
            voice_enabled: false,
            beep_enabled: true,
            volume: -2.0,
            language: Language::En,
            min_distance: 100.0,
            max_distance: 50.0,
            min_speed: 99.0,
            beep_start_distance: 10.0,
            beep_interval_at_far: 1000,
            beep_interval_at_near: 2000,
        };
        let fixed = wild.clamped();
        assert_eq!(fixed.validate(), Ok(()));
        assert_eq!(fixed.volume, 0.0);
        assert_eq!(fixed.min_speed, 20.0);
        assert!(!fixed.voice_enabled);
        assert_eq!(fixed.language, Language::En);
    }

    #[test]
    fn deserializes_partial_camel_case_payload() {
        let s: AlertSettings =
            serde_json::from_str(r#"{"minDistance": 30, "language": "en", "beepIntervalAtNear": 250}"#)
                .unwrap();
        assert_eq!(s.min_distance, 30.0);
        assert_eq!(s.language, Language::En);
        assert_eq!(s.beep_interval_at_near, 250);
        assert_eq!(s.max_distance, AlertSettings::default().max_distance);
    }
}
