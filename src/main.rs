use road_hazard_alerts::alert::AlertController;
use road_hazard_alerts::bridge;
use road_hazard_alerts::config::AppConfig;
use road_hazard_alerts::db::{self, LocalStore};
use road_hazard_alerts::feed::CachedWarningFeed;
use road_hazard_alerts::gateway::HttpGateway;
use road_hazard_alerts::models::message::OutboundMessage;
use road_hazard_alerts::models::settings::AlertSettings;
use road_hazard_alerts::processor::message_processor::MessageProcessor;
use road_hazard_alerts::sync::SyncEngine;
use road_hazard_alerts::tracker::{self, TrackerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging; stdout carries the message bridge
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting road hazard alert engine...");

    // Init DB
    let pool = db::init_pool(&config.database_url).await?;
    info!("Local store ready at {}", config.database_url);
    let store = LocalStore::new(pool);

    let settings = match store.load_settings().await {
        Ok(Some(settings)) => settings.clamped(),
        Ok(None) => AlertSettings::default(),
        Err(e) => {
            warn!("Could not load saved alert settings, using defaults: {}", e);
            AlertSettings::default()
        }
    };

    let gateway = Arc::new(HttpGateway::from_config(&config)?);
    let sync = Arc::new(SyncEngine::new(
        store.clone(),
        Arc::clone(&gateway),
        config.upload_batch_size,
        config.retention_days,
    ));
    let controller = AlertController::new(settings);

    let (out_tx, out_rx) = mpsc::channel(256);
    let (fix_tx, fix_rx) = watch::channel(None);
    let (reaction_tx, reaction_rx) = mpsc::channel(64);

    let writer = tokio::spawn(bridge::write_outbound(tokio::io::stdout(), out_rx));
    let background = vec![
        tokio::spawn(Arc::clone(&sync).run(config.sync_interval())),
        tokio::spawn(bridge::forward_sync_status(sync.subscribe(), out_tx.clone())),
        tokio::spawn(tracker::run_tracker(
            controller.clone(),
            CachedWarningFeed::new(store),
            fix_rx,
            TrackerConfig::from(&config),
            out_tx.clone(),
            reaction_tx,
        )),
        tokio::spawn(tracker::report_reactions(Arc::clone(&gateway), reaction_rx)),
    ];

    let processor = MessageProcessor::new(controller.clone(), sync, fix_tx, out_tx.clone());
    let input = BufReader::new(tokio::io::stdin());

    tokio::select! {
        res = bridge::consume_lines(input, &processor) => {
            if let Err(e) = res {
                error!("Telemetry input failed: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
    }

    for effect in controller.stop() {
        let _ = out_tx.send(OutboundMessage::Effect(effect)).await;
    }
    for task in &background {
        task.abort();
    }
    drop(processor);
    drop(out_tx);

    if tokio::time::timeout(Duration::from_secs(2), writer).await.is_err() {
        warn!("Output writer did not drain in time");
    }
    info!("Stopped");
    Ok(())
}
