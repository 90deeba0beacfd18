use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::alert::AlertController;
use crate::gateway::RemoteGateway;
use crate::geo::BoundingBox;
use crate::models::message::{Fix, InboundMessage, OutboundMessage};
use crate::models::sensor_sample::NewSensorSample;
use crate::models::settings::SettingsUpdate;
use crate::sync::SyncEngine;
use crate::tracker::VehicleFix;

/// Handles for everything an inbound message can touch.
pub struct MessageProcessor<G> {
    controller: AlertController,
    sync: Arc<SyncEngine<G>>,
    fix: watch::Sender<Option<VehicleFix>>,
    out: mpsc::Sender<OutboundMessage>,
}

impl<G: RemoteGateway + 'static> MessageProcessor<G> {
    pub fn new(
        controller: AlertController,
        sync: Arc<SyncEngine<G>>,
        fix: watch::Sender<Option<VehicleFix>>,
        out: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            controller,
            sync,
            fix,
            out,
        }
    }

    /// Parses and applies one inbound payload. Unparseable payloads are logged
    /// and skipped; only a closed output channel is an error.
    pub async fn process_message(&self, payload: &[u8]) -> anyhow::Result<()> {
        let message: InboundMessage = match serde_json::from_slice(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to parse message: {}", e);
                return Ok(());
            }
        };

        match message {
            InboundMessage::Fix(fix) => self.handle_fix(fix).await,
            InboundMessage::Settings(update) => self.handle_settings(update).await?,
            InboundMessage::StartTracking => {
                let session = self.controller.start();
                info!("Tracking started (session {})", session);
                self.emit(OutboundMessage::Snapshot(self.controller.snapshot()))
                    .await?;
            }
            InboundMessage::StopTracking => {
                for effect in self.controller.stop() {
                    self.emit(OutboundMessage::Effect(effect)).await?;
                }
                info!("Tracking stopped");
                self.emit(OutboundMessage::Snapshot(self.controller.snapshot()))
                    .await?;
            }
            InboundMessage::DownloadRegion { code, name, bounds } => {
                self.spawn_region_download(code, name, bounds)
            }
            InboundMessage::ListRegions => self.spawn_region_listing(),
        }
        Ok(())
    }

    async fn handle_fix(&self, fix: Fix) {
        let current = VehicleFix {
            position: fix.position(),
            speed: fix.speed(),
        };
        // Speed history for reactions is recorded per tick, not per fix.
        self.fix.send_replace(Some(current));

        let sample = NewSensorSample::new(
            current.position,
            fix.timestamp.unwrap_or_else(Utc::now),
            current.speed,
            fix.accuracy.unwrap_or(0.0),
            fix.accel(),
        );
        match self.sync.store().insert_sample(&sample).await {
            Ok(id) => debug!("Stored sensor sample {} (quality {:.2})", id, sample.road_quality),
            Err(e) => error!("Failed to store sensor sample: {}", e),
        }
    }

    async fn handle_settings(&self, update: SettingsUpdate) -> anyhow::Result<()> {
        let settings = update.apply_to(&self.controller.settings());
        if let Err(e) = settings.validate() {
            warn!("Rejected alert settings: {}", e);
            return self
                .emit(OutboundMessage::SettingsRejected {
                    reason: e.to_string(),
                })
                .await;
        }

        self.controller.update_settings(settings.clone());
        if let Err(e) = self.sync.store().save_settings(&settings).await {
            error!("Failed to persist alert settings: {}", e);
        }
        info!("Alert settings updated");
        Ok(())
    }

    fn spawn_region_download(&self, code: String, name: String, bounds: BoundingBox) {
        let sync = Arc::clone(&self.sync);
        let out = self.out.clone();
        tokio::spawn(async move {
            let ok = sync.download_region(&code, &name, bounds).await;
            if out
                .send(OutboundMessage::RegionDownloaded { code, ok })
                .await
                .is_err()
            {
                debug!("Output closed before region download finished");
            }
        });
    }

    fn spawn_region_listing(&self) {
        let sync = Arc::clone(&self.sync);
        let out = self.out.clone();
        tokio::spawn(async move {
            let available = sync.available_regions().await;
            let downloaded = match sync.store().region_statuses().await {
                Ok(statuses) => statuses,
                Err(e) => {
                    error!("Failed to read downloaded regions: {}", e);
                    Vec::new()
                }
            };
            if out
                .send(OutboundMessage::Regions {
                    available,
                    downloaded,
                })
                .await
                .is_err()
            {
                debug!("Output closed before region list was ready");
            }
        });
    }

    async fn emit(&self, message: OutboundMessage) -> anyhow::Result<()> {
        self.out
            .send(message)
            .await
            .map_err(|_| anyhow::anyhow!("output channel closed"))
    }
}
