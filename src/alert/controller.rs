use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::audio;
use crate::models::obstacle::{Obstacle, ObstacleId, ObstacleType};
use crate::models::settings::AlertSettings;

/// Lifetime of an alert record after the first announcement.
pub const ALERT_TTL: Duration = Duration::from_secs(60);
/// An obstacle still awaiting a reaction closer than this was driven over.
pub const IGNORED_DISTANCE_M: f64 = 50.0;
/// Speed drop, in km/h, that counts as the driver reacting.
pub const REACTION_SPEED_DROP_KMH: f64 = 5.0;
const MPS_TO_KMH: f64 = 3.6;

pub type SessionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Alerted,
    AwaitingReaction,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionOutcome {
    Confirmed,
    Ignored,
}

#[derive(Debug)]
pub struct AlertRecord {
    pub obstacle_id: ObstacleId,
    pub state: AlertState,
    pub alerted_at: Instant,
    pub expires_at: Instant,
    expiry: AbortHandle,
}

impl AlertRecord {
    fn awaiting_reaction(&self) -> bool {
        matches!(self.state, AlertState::Alerted | AlertState::AwaitingReaction)
    }
}

/// Driver reaction handed to the data-collection collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionReport {
    pub obstacle_id: ObstacleId,
    pub obstacle_type: ObstacleType,
    pub latitude: f64,
    pub longitude: f64,
    pub distance: f64,
    pub outcome: ReactionOutcome,
    pub speed_before: f64,
    pub speed_after: f64,
    pub reported_at: DateTime<Utc>,
}

/// Output of a controller operation, to be presented by the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AlertEffect {
    Voice {
        obstacle_id: ObstacleId,
        obstacle_type: ObstacleType,
        distance: f64,
        text: String,
        volume: f64,
    },
    /// Starts or retimes the single beep channel; replaces any previous cadence.
    BeepStart {
        obstacle_id: ObstacleId,
        interval_ms: u32,
        volume: f64,
    },
    BeepStop {
        obstacle_id: ObstacleId,
    },
    Reaction(ReactionReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSnapshot {
    pub obstacle: Option<Obstacle>,
    pub critical: bool,
    pub progress_percent: Option<f64>,
    /// Time left before the current obstacle's alert record expires.
    pub expires_in_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveBeep {
    obstacle_id: ObstacleId,
    interval_ms: u32,
}

#[derive(Debug, Default)]
struct SessionState {
    session: Option<SessionId>,
    settings: AlertSettings,
    records: HashMap<ObstacleId, AlertRecord>,
    active: Option<ActiveBeep>,
    passed: HashSet<ObstacleId>,
    previous_speed: Option<f64>,
    current_speed: Option<f64>,
    current: Option<Obstacle>,
}

/// Per-obstacle alert state machine for one tracking session at a time.
///
/// Every deferred callback carries the `SessionId` it was created under and is a
/// no-op once that session has been stopped, so a restart never sees effects from
/// the previous session.
#[derive(Debug, Clone)]
pub struct AlertController {
    inner: Arc<Mutex<SessionState>>,
}

impl AlertController {
    pub fn new(settings: AlertSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                settings,
                ..SessionState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begins a new tracking session, tearing down any previous one.
    pub fn start(&self) -> SessionId {
        let mut state = self.lock();
        state.teardown();
        let id = Uuid::new_v4();
        state.session = Some(id);
        info!("Tracking session {} started", id);
        id
    }

    /// Ends the session: cancels every expiry timer and clears all records, the
    /// beep slot and the passed set. Safe to call repeatedly.
    pub fn stop(&self) -> Vec<AlertEffect> {
        let mut state = self.lock();
        if let Some(id) = state.session.take() {
            info!("Tracking session {} stopped", id);
        }
        let effects = state
            .active
            .take()
            .map(|a| AlertEffect::BeepStop {
                obstacle_id: a.obstacle_id,
            })
            .into_iter()
            .collect();
        state.teardown();
        effects
    }

    pub fn session(&self) -> Option<SessionId> {
        self.lock().session
    }

    pub fn is_tracking(&self) -> bool {
        self.session().is_some()
    }

    pub fn settings(&self) -> AlertSettings {
        self.lock().settings.clone()
    }

    pub fn update_settings(&self, settings: AlertSettings) {
        self.lock().settings = settings;
    }

    pub fn on_speed_changed(&self, previous_speed: f64, current_speed: f64) {
        self.lock().record_speed(previous_speed, current_speed);
    }

    /// One fetch cycle for `session`: records the speed, evaluates reactions for
    /// obstacles that are awaiting one, then processes the fetched list. Returns
    /// nothing if `session` is no longer the live session.
    pub fn tick(
        &self,
        session: SessionId,
        mut obstacles: Vec<Obstacle>,
        vehicle_speed: f64,
    ) -> Vec<AlertEffect> {
        let mut state = self.lock();
        if state.session != Some(session) {
            debug!("Dropping tick from stale session {}", session);
            return Vec::new();
        }

        let previous_speed = state.current_speed.unwrap_or(vehicle_speed);
        state.record_speed(previous_speed, vehicle_speed);

        let mut effects = Vec::new();
        for obstacle in obstacles.iter_mut() {
            if let Some(report) = state.evaluate_reaction(obstacle, previous_speed, vehicle_speed) {
                effects.push(AlertEffect::Reaction(report));
            }
        }
        effects.extend(state.process_fetched(&obstacles, vehicle_speed, &self.inner));
        effects
    }

    pub fn on_obstacles_fetched(&self, obstacles: &[Obstacle], vehicle_speed: f64) -> Vec<AlertEffect> {
        self.lock()
            .process_fetched(obstacles, vehicle_speed, &self.inner)
    }

    pub fn evaluate_reaction(
        &self,
        obstacle: &mut Obstacle,
        previous_speed: f64,
        current_speed: f64,
    ) -> Option<ReactionReport> {
        self.lock()
            .evaluate_reaction(obstacle, previous_speed, current_speed)
    }

    pub fn record_state(&self, obstacle_id: &str) -> Option<AlertState> {
        self.lock().records.get(obstacle_id).map(|r| r.state)
    }

    pub fn snapshot(&self) -> AlertSnapshot {
        let state = self.lock();
        let obstacle = state.current.clone();
        let critical = obstacle.as_ref().is_some_and(|o| {
            o.kind == ObstacleType::Accident
                || state.active.as_ref().is_some_and(|a| a.obstacle_id == o.id)
        });
        let expires_in_ms = obstacle
            .as_ref()
            .and_then(|o| state.records.get(&o.id))
            .map(|r| {
                r.expires_at
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64
            });
        AlertSnapshot {
            progress_percent: obstacle.as_ref().map(Obstacle::progress_percent),
            obstacle,
            critical,
            expires_in_ms,
        }
    }
}

impl SessionState {
    fn record_speed(&mut self, previous_speed: f64, current_speed: f64) {
        self.previous_speed = Some(previous_speed);
        self.current_speed = Some(current_speed);
    }

    fn teardown(&mut self) {
        for (_, record) in self.records.drain() {
            debug!("Cancelling alert expiry for {}", record.obstacle_id);
            record.expiry.abort();
        }
        self.active = None;
        self.passed.clear();
        self.current = None;
        self.previous_speed = None;
        self.current_speed = None;
    }

    fn evaluate_reaction(
        &mut self,
        obstacle: &mut Obstacle,
        previous_speed: f64,
        current_speed: f64,
    ) -> Option<ReactionReport> {
        let record = self.records.get_mut(&obstacle.id)?;
        if !record.awaiting_reaction() {
            return None;
        }

        let drop_kmh = (previous_speed - current_speed) * MPS_TO_KMH;
        let outcome = if drop_kmh > REACTION_SPEED_DROP_KMH {
            ReactionOutcome::Confirmed
        } else if obstacle.distance < IGNORED_DISTANCE_M {
            ReactionOutcome::Ignored
        } else {
            record.state = AlertState::AwaitingReaction;
            return None;
        };

        record.state = AlertState::Resolved;
        if outcome == ReactionOutcome::Ignored {
            obstacle.passed = true;
            self.passed.insert(obstacle.id.clone());
        }
        info!(
            "Obstacle {} resolved as {:?} after {:?} (speed {:.1} -> {:.1} m/s, {:.0} m)",
            obstacle.id,
            outcome,
            record.alerted_at.elapsed(),
            previous_speed,
            current_speed,
            obstacle.distance
        );

        Some(ReactionReport {
            obstacle_id: obstacle.id.clone(),
            obstacle_type: obstacle.kind,
            latitude: obstacle.latitude,
            longitude: obstacle.longitude,
            distance: obstacle.distance,
            outcome,
            speed_before: previous_speed,
            speed_after: current_speed,
            reported_at: Utc::now(),
        })
    }

    fn process_fetched(
        &mut self,
        obstacles: &[Obstacle],
        vehicle_speed: f64,
        inner: &Arc<Mutex<SessionState>>,
    ) -> Vec<AlertEffect> {
        let Some(session) = self.session else {
            return Vec::new();
        };
        let settings = self.settings.clone();
        let mut effects = Vec::new();
        let mut nearest_beep: Option<(&Obstacle, u32)> = None;
        let mut nearest_alert: Option<&Obstacle> = None;

        for obstacle in obstacles {
            if obstacle.passed
                || self.passed.contains(&obstacle.id)
                || !audio::in_alert_window(obstacle.distance, &settings)
            {
                continue;
            }

            let first_encounter = !self.records.contains_key(&obstacle.id);
            if first_encounter {
                let now = Instant::now();
                let expiry = spawn_expiry(Arc::clone(inner), session, obstacle.id.clone());
                self.records.insert(
                    obstacle.id.clone(),
                    AlertRecord {
                        obstacle_id: obstacle.id.clone(),
                        state: AlertState::Alerted,
                        alerted_at: now,
                        expires_at: now + ALERT_TTL,
                        expiry,
                    },
                );
                info!(
                    "Alerting {} {} at {:.0} m",
                    obstacle.kind, obstacle.id, obstacle.distance
                );
            }

            let decision = audio::compute(obstacle, vehicle_speed, &settings, first_encounter);
            if decision.voice {
                effects.push(AlertEffect::Voice {
                    obstacle_id: obstacle.id.clone(),
                    obstacle_type: obstacle.kind,
                    distance: obstacle.distance,
                    text: audio::voice_text(obstacle, settings.language),
                    volume: settings.volume,
                });
            }
            if decision.beep && nearest_beep.map_or(true, |(o, _)| obstacle.distance < o.distance) {
                nearest_beep = Some((obstacle, decision.beep_interval_ms));
            }
            if nearest_alert.map_or(true, |o| obstacle.distance < o.distance) {
                nearest_alert = Some(obstacle);
            }
        }

        self.current = nearest_beep.map(|(o, _)| o).or(nearest_alert).cloned();
        let next = nearest_beep.map(|(o, interval)| ActiveBeep {
            obstacle_id: o.id.clone(),
            interval_ms: interval,
        });
        effects.extend(self.assign_beep_slot(next, settings.volume));
        effects
    }

    fn assign_beep_slot(&mut self, next: Option<ActiveBeep>, volume: f64) -> Vec<AlertEffect> {
        let previous = self.active.take();
        let mut effects = Vec::new();
        match (previous, next) {
            (Some(prev), Some(next)) if prev == next => {
                self.active = Some(prev);
            }
            (previous, Some(next)) => {
                if let Some(prev) = previous.filter(|p| p.obstacle_id != next.obstacle_id) {
                    effects.push(AlertEffect::BeepStop {
                        obstacle_id: prev.obstacle_id,
                    });
                }
                effects.push(AlertEffect::BeepStart {
                    obstacle_id: next.obstacle_id.clone(),
                    interval_ms: next.interval_ms,
                    volume,
                });
                self.active = Some(next);
            }
            (Some(prev), None) => effects.push(AlertEffect::BeepStop {
                obstacle_id: prev.obstacle_id,
            }),
            (None, None) => {}
        }
        effects
    }
}

fn spawn_expiry(
    inner: Arc<Mutex<SessionState>>,
    session: SessionId,
    obstacle_id: ObstacleId,
) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(ALERT_TTL).await;
        let mut state = inner.lock().unwrap_or_else(PoisonError::into_inner);
        if state.session != Some(session) {
            return;
        }
        if state.records.remove(&obstacle_id).is_some() {
            debug!("Alert record for {} expired", obstacle_id);
        }
    })
    .abort_handle()
}
