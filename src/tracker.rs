use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::alert::{AlertController, AlertEffect, ReactionReport};
use crate::config::AppConfig;
use crate::feed::ProximityFeed;
use crate::gateway::RemoteGateway;
use crate::geo::Position;
use crate::models::message::OutboundMessage;

/// Latest known position and speed (m/s) of the vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleFix {
    pub position: Position,
    pub speed: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub period: Duration,
    pub radius_m: f64,
    pub min_confirmations: u32,
}

impl From<&AppConfig> for TrackerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            period: config.fetch_interval(),
            radius_m: config.proximity_radius_m,
            min_confirmations: config.min_confirmations,
        }
    }
}

/// One fetch/alert cycle. Does nothing while tracking is off or the position is
/// unknown. If the session ends while the feed is being queried, the result is
/// dropped by the controller.
pub async fn poll_once<F: ProximityFeed + ?Sized>(
    controller: &AlertController,
    feed: &F,
    fix: Option<VehicleFix>,
    config: &TrackerConfig,
) -> anyhow::Result<Vec<AlertEffect>> {
    let Some(session) = controller.session() else {
        return Ok(Vec::new());
    };
    let Some(fix) = fix else {
        debug!("No position yet, skipping obstacle fetch");
        return Ok(Vec::new());
    };

    let obstacles = feed
        .fetch_nearby(fix.position, config.radius_m, config.min_confirmations)
        .await?;
    Ok(controller.tick(session, obstacles, fix.speed))
}

/// Periodic obstacle-fetch loop. Effects go to the presentation channel and
/// driver reactions to the reporter.
pub async fn run_tracker<F: ProximityFeed>(
    controller: AlertController,
    feed: F,
    fix: watch::Receiver<Option<VehicleFix>>,
    config: TrackerConfig,
    out: mpsc::Sender<OutboundMessage>,
    reactions: mpsc::Sender<ReactionReport>,
) {
    info!("Obstacle tracker polling every {:?}", config.period);
    let mut interval = tokio::time::interval(config.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let current_fix = *fix.borrow();
        let effects = match poll_once(&controller, &feed, current_fix, &config).await {
            Ok(effects) => effects,
            Err(e) => {
                warn!("Obstacle fetch failed: {:#}", e);
                continue;
            }
        };
        if !controller.is_tracking() {
            continue;
        }

        for effect in effects {
            if let AlertEffect::Reaction(report) = &effect {
                if reactions.try_send(report.clone()).is_err() {
                    warn!("Reaction queue full, dropping report for {}", report.obstacle_id);
                }
            }
            if out.send(OutboundMessage::Effect(effect)).await.is_err() {
                return;
            }
        }
        if out
            .send(OutboundMessage::Snapshot(controller.snapshot()))
            .await
            .is_err()
        {
            return;
        }
    }
}

/// Forwards driver reactions to the remote service. Best effort: a report that
/// fails to send is logged and dropped.
pub async fn report_reactions<G: RemoteGateway>(
    gateway: Arc<G>,
    mut reactions: mpsc::Receiver<ReactionReport>,
) {
    while let Some(report) = reactions.recv().await {
        match gateway.report_reaction(&report).await {
            Ok(()) => debug!("Reported {:?} for {}", report.outcome, report.obstacle_id),
            Err(e) => warn!("Could not report reaction for {}: {}", report.obstacle_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::ReactionOutcome;
    use crate::gateway::fake::FakeGateway;
    use crate::models::obstacle::{Obstacle, ObstacleType};
    use crate::models::settings::AlertSettings;
    use async_trait::async_trait;

    struct StaticFeed(Vec<Obstacle>);

    #[async_trait]
    impl ProximityFeed for StaticFeed {
        async fn fetch_nearby(&self, _: Position, _: f64, _: u32) -> anyhow::Result<Vec<Obstacle>> {
            Ok(self.0.clone())
        }
    }

    /// Ends the tracking session while the fetch is in flight.
    struct StoppingFeed(AlertController);

    #[async_trait]
    impl ProximityFeed for StoppingFeed {
        async fn fetch_nearby(&self, _: Position, _: f64, _: u32) -> anyhow::Result<Vec<Obstacle>> {
            self.0.stop();
            Ok(vec![Obstacle::new("a", ObstacleType::Bump, 0.0, 0.0, 150.0, 1)])
        }
    }

    fn config() -> TrackerConfig {
        TrackerConfig {
            period: Duration::from_secs(30),
            radius_m: 1000.0,
            min_confirmations: 1,
        }
    }

    fn fix() -> Option<VehicleFix> {
        Some(VehicleFix {
            position: Position { latitude: 55.75, longitude: 37.61 },
            speed: 15.0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn poll_requires_session_and_position() {
        let controller = AlertController::new(AlertSettings::default());
        let feed = StaticFeed(vec![Obstacle::new("a", ObstacleType::Pothole, 0.0, 0.0, 150.0, 1)]);

        assert!(poll_once(&controller, &feed, fix(), &config()).await.unwrap().is_empty());
        controller.start();
        assert!(poll_once(&controller, &feed, None, &config()).await.unwrap().is_empty());
        assert!(!poll_once(&controller, &feed, fix(), &config()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn results_arriving_after_stop_are_discarded() {
        let controller = AlertController::new(AlertSettings::default());
        controller.start();
        let feed = StoppingFeed(controller.clone());

        let effects = poll_once(&controller, &feed, fix(), &config()).await.unwrap();
        assert!(effects.is_empty());
        assert_eq!(controller.record_state("a"), None);
    }

    #[tokio::test]
    async fn reactions_are_forwarded_to_the_gateway() {
        let gateway = Arc::new(FakeGateway::new());
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(report_reactions(Arc::clone(&gateway), rx));

        tx.send(ReactionReport {
            obstacle_id: "a".to_string(),
            obstacle_type: ObstacleType::Pothole,
            latitude: 55.75,
            longitude: 37.61,
            distance: 30.0,
            outcome: ReactionOutcome::Ignored,
            speed_before: 15.0,
            speed_after: 15.0,
            reported_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
        drop(tx);
        task.await.unwrap();

        let reported = gateway.reactions.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].outcome, ReactionOutcome::Ignored);
    }
}
