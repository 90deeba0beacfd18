//! Maps an obstacle, the vehicle speed and the user's settings to an alert
//! decision. Pure: timers and sound channels belong to the caller.

use crate::models::obstacle::{Obstacle, ObstacleType};
use crate::models::settings::{AlertSettings, Language};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertDecision {
    pub voice: bool,
    pub beep: bool,
    pub beep_interval_ms: u32,
}

impl AlertDecision {
    const SILENT: AlertDecision = AlertDecision {
        voice: false,
        beep: false,
        beep_interval_ms: 0,
    };
}

pub fn in_alert_window(distance: f64, settings: &AlertSettings) -> bool {
    distance >= settings.min_distance && distance <= settings.max_distance
}

/// `first_encounter` is true only on the evaluation that created the obstacle's
/// alert record; it is what makes the voice announcement one-shot.
pub fn compute(
    obstacle: &Obstacle,
    vehicle_speed: f64,
    settings: &AlertSettings,
    first_encounter: bool,
) -> AlertDecision {
    if !in_alert_window(obstacle.distance, settings) {
        return AlertDecision::SILENT;
    }

    let voice = first_encounter && settings.voice_enabled;
    let beep = settings.beep_enabled
        && obstacle.distance <= settings.beep_start_distance
        && vehicle_speed >= settings.min_speed;

    AlertDecision {
        voice,
        beep,
        beep_interval_ms: if beep {
            beep_interval_ms(obstacle.distance, settings)
        } else {
            0
        },
    }
}

/// Linear from `beep_interval_at_far` at `beep_start_distance` down to
/// `beep_interval_at_near` at `min_distance`, clamped to that range.
pub fn beep_interval_ms(distance: f64, settings: &AlertSettings) -> u32 {
    let near = settings.beep_interval_at_near;
    let far = settings.beep_interval_at_far;
    let span = settings.beep_start_distance - settings.min_distance;
    if span <= 0.0 {
        return near;
    }

    let t = ((distance - settings.min_distance) / span).clamp(0.0, 1.0);
    let interval = near as f64 + t * (far as f64 - near as f64);
    (interval.round() as u32).clamp(near.min(far), far.max(near))
}

/// Spoken announcement for a newly alerted obstacle.
pub fn voice_text(obstacle: &Obstacle, language: Language) -> String {
    let meters = ((obstacle.distance / 10.0).round() * 10.0) as u32;
    match language {
        Language::En => format!("{} ahead in {} meters", en_name(obstacle.kind), meters),
        Language::Ru => format!("Впереди {}, {} метров", ru_name(obstacle.kind), meters),
    }
}

fn en_name(kind: ObstacleType) -> &'static str {
    match kind {
        ObstacleType::Pothole => "Pothole",
        ObstacleType::SpeedBump => "Speed bump",
        ObstacleType::Bump => "Bump",
        ObstacleType::Braking => "Hard braking zone",
        ObstacleType::Vibration => "Rough road",
        ObstacleType::Accident => "Accident",
    }
}

fn ru_name(kind: ObstacleType) -> &'static str {
    match kind {
        ObstacleType::Pothole => "яма",
        ObstacleType::SpeedBump => "лежачий полицейский",
        ObstacleType::Bump => "неровность",
        ObstacleType::Braking => "зона резкого торможения",
        ObstacleType::Vibration => "плохая дорога",
        ObstacleType::Accident => "авария",
    }
}
