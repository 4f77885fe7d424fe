mod alarm;
mod camera;
mod config;
mod crypto;
mod delivery;
mod gate;
mod location;
mod models;
mod platform;
mod store;

use std::sync::Arc;
use std::time::Duration;

use config::AppConfig;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting Theftguard engine...");

    // Open local store
    let pool = store::init_pool(&config.database_url).await?;
    info!("Opened local store at {}", config.database_url);

    // Outbound delivery
    let transport = Arc::new(delivery::HttpTransport::new());
    let queue = delivery::DeliveryQueue::new(
        transport,
        pool.clone(),
        delivery::DeliveryConfig::from_app(&config),
    );

    // Location tracking
    let locations = location::LocationProvider::new(
        Arc::new(platform::IdleGeoSource),
        queue.clone(),
        pool.clone(),
        location::LocationConfig {
            accuracy_threshold_m: config.location_accuracy_threshold_m,
            history_capacity: config.location_history_capacity,
            device_id: config.device_id.clone(),
        },
    );
    locations.start_tracking();

    // Alarm engine, wired with whatever hardware this host offers
    let capture = camera::EvidenceCapture::new(
        Arc::new(camera::UnavailableCamera),
        locations.clone(),
        config.device_id.clone(),
    );
    let effects = alarm::Effects {
        sound: Arc::new(platform::LogSound),
        vibration: Arc::new(platform::LogVibration),
        flasher: Arc::new(platform::LogFlasher),
        power: Arc::new(platform::LogPower),
    };
    let orchestrator = alarm::AlarmOrchestrator::new(
        effects,
        capture,
        locations.clone(),
        queue.clone(),
        pool.clone(),
        alarm::AlarmConfig::from_app(&config),
    );

    let _gate = gate::SecretAccessGate::new(
        gate::GateConfig::from_app(&config),
        Arc::new(crypto::Sha256Encryption),
        pool.clone(),
        orchestrator.clone(),
    );
    info!("Secret-access gate armed ({} taps)", config.required_corner_taps);

    // THEFTGUARD_SELF_TEST_SECS=5 runs a manual-trigger alarm at startup
    if let Some(secs) = std::env::var("THEFTGUARD_SELF_TEST_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
    {
        info!("Running alarm self test for {}s", secs);
        orchestrator.test_alarm(Duration::from_secs(secs)).await?;
    }

    // Opportunistic retry of parked deliveries until shutdown
    let mut drain_tick = tokio::time::interval(Duration::from_secs(config.drain_interval_secs));
    loop {
        tokio::select! {
            _ = drain_tick.tick() => {
                if let Err(e) = queue.drain().await {
                    error!("Drain failed: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    locations.stop_tracking();
    orchestrator.deactivate().await?;
    Ok(())
}
