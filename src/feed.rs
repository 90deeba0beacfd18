use async_trait::async_trait;
use tracing::debug;

use crate::db::LocalStore;
use crate::geo::{haversine_m, BoundingBox, Position};
use crate::models::obstacle::{Obstacle, ObstacleType};

/// Source of nearby obstacles polled by the tracker.
#[async_trait]
pub trait ProximityFeed: Send + Sync {
    async fn fetch_nearby(
        &self,
        position: Position,
        radius_m: f64,
        min_confirmations: u32,
    ) -> anyhow::Result<Vec<Obstacle>>;
}

pub fn closest(obstacles: &[Obstacle]) -> Option<&Obstacle> {
    obstacles
        .iter()
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

/// Answers proximity queries from the locally cached warnings, so alerting keeps
/// working offline.
#[derive(Debug, Clone)]
pub struct CachedWarningFeed {
    store: LocalStore,
}

impl CachedWarningFeed {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProximityFeed for CachedWarningFeed {
    async fn fetch_nearby(
        &self,
        position: Position,
        radius_m: f64,
        min_confirmations: u32,
    ) -> anyhow::Result<Vec<Obstacle>> {
        let bbox = BoundingBox::around(position, radius_m);
        let rows = self.store.warnings_in_bounds(&bbox).await?;

        let mut obstacles: Vec<Obstacle> = rows
            .into_iter()
            .filter(|w| w.confirmations >= min_confirmations)
            .filter_map(|w| {
                let kind = match w.hazard_type.parse::<ObstacleType>() {
                    Ok(kind) => kind,
                    Err(e) => {
                        debug!("Skipping warning {}: {}", w.server_id, e);
                        return None;
                    }
                };
                let distance = haversine_m(position, w.position());
                (distance <= radius_m).then(|| {
                    Obstacle::new(w.server_id, kind, w.latitude, w.longitude, distance, w.confirmations)
                })
            })
            .collect();

        obstacles.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(obstacles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::models::warning::WarningRecord;
    use chrono::Utc;

    fn warning(id: &str, lat: f64, lon: f64, kind: &str, confirmations: u32) -> WarningRecord {
        WarningRecord {
            server_id: id.to_string(),
            latitude: lat,
            longitude: lon,
            hazard_type: kind.to_string(),
            severity: 1,
            description: None,
            is_verified: false,
            region: "RU-MOW".to_string(),
            confirmations,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn returns_confirmed_known_hazards_within_radius_nearest_first() {
        let store = LocalStore::new(memory_pool().await);
        let here = Position { latitude: 55.7500, longitude: 37.6100 };
        for w in [
            warning("near", 55.7510, 37.6100, "pothole", 3),
            warning("nearer", 55.7503, 37.6100, "speed_bump", 2),
            warning("unconfirmed", 55.7505, 37.6100, "bump", 1),
            warning("unknown", 55.7502, 37.6100, "sinkhole", 5),
            // Inside the bounding box corner but beyond the radius.
            warning("corner", 55.7580, 37.6240, "accident", 9),
            warning("far", 55.8000, 37.6100, "pothole", 9),
        ] {
            store.upsert_warning(&w).await.unwrap();
        }

        let feed = CachedWarningFeed::new(store);
        let obstacles = feed.fetch_nearby(here, 1000.0, 2).await.unwrap();
        let ids: Vec<&str> = obstacles.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["nearer", "near"]);
        assert_eq!(obstacles[0].kind, ObstacleType::SpeedBump);
        assert!((obstacles[1].distance - 111.2).abs() < 1.0);
        assert_eq!(closest(&obstacles).map(|o| o.id.as_str()), Some("nearer"));
    }

    #[test]
    fn closest_of_nothing_is_none() {
        assert!(closest(&[]).is_none());
    }
}
