use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type ObstacleId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleType {
    Pothole,
    SpeedBump,
    Bump,
    Braking,
    Vibration,
    Accident,
}

impl ObstacleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObstacleType::Pothole => "pothole",
            ObstacleType::SpeedBump => "speed_bump",
            ObstacleType::Bump => "bump",
            ObstacleType::Braking => "braking",
            ObstacleType::Vibration => "vibration",
            ObstacleType::Accident => "accident",
        }
    }

    /// Distance at which the warning progress bar starts filling. Cosmetic only,
    /// independent of the alert window in `AlertSettings`.
    pub fn max_warning_distance(&self) -> f64 {
        match self {
            ObstacleType::Pothole => 300.0,
            ObstacleType::SpeedBump => 200.0,
            ObstacleType::Bump => 200.0,
            ObstacleType::Braking => 400.0,
            ObstacleType::Vibration => 150.0,
            ObstacleType::Accident => 500.0,
        }
    }
}

impl fmt::Display for ObstacleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObstacleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pothole" => Ok(ObstacleType::Pothole),
            "speed_bump" | "speedbump" => Ok(ObstacleType::SpeedBump),
            "bump" => Ok(ObstacleType::Bump),
            "braking" => Ok(ObstacleType::Braking),
            "vibration" => Ok(ObstacleType::Vibration),
            "accident" => Ok(ObstacleType::Accident),
            other => Err(format!("unknown obstacle type '{other}'")),
        }
    }
}

/// A hazard relevant to the current trip. `distance` is recomputed on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Obstacle {
    pub id: ObstacleId,
    #[serde(rename = "type")]
    pub kind: ObstacleType,
    pub latitude: f64,
    pub longitude: f64,
    pub distance: f64,
    pub confirmations: u32,
    #[serde(default)]
    pub passed: bool,
}

impl Obstacle {
    pub fn new(
        id: impl Into<ObstacleId>,
        kind: ObstacleType,
        latitude: f64,
        longitude: f64,
        distance: f64,
        confirmations: u32,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            latitude,
            longitude,
            distance: distance.max(0.0),
            confirmations: confirmations.max(1),
            passed: false,
        }
    }

    /// Progress towards the obstacle on the per-type cosmetic scale, 0..=100.
    pub fn progress_percent(&self) -> f64 {
        let max = self.kind.max_warning_distance();
        ((1.0 - self.distance / max) * 100.0).clamp(0.0, 100.0)
    }
}
