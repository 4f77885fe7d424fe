use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::location::GeoSource;
use crate::models::location::LocationFix;

/// Loops a named sound asset at maximum volume until stopped. Loading an
/// unknown asset fails; playback itself is fire-and-forget.
#[async_trait]
pub trait SoundEngine: Send + Sync {
    async fn play_looping(&self, sound: &str) -> Result<()>;
    async fn stop(&self);
}

#[async_trait]
pub trait VibrationMotor: Send + Sync {
    async fn vibrate(&self, pattern_ms: &[u64]) -> Result<()>;
}

#[async_trait]
pub trait ScreenFlasher: Send + Sync {
    async fn show_color(&self, color: &str) -> Result<()>;
    async fn clear(&self);
}

/// Keeps the device awake while an alarm is active.
pub trait PowerManager: Send + Sync {
    fn prevent_sleep(&self);
    fn allow_sleep(&self);
}

// Dev implementations: let the daemon run end-to-end on a workstation where
// none of the device hardware exists.

pub struct LogSound;

#[async_trait]
impl SoundEngine for LogSound {
    async fn play_looping(&self, sound: &str) -> Result<()> {
        info!("[sound] looping '{}'", sound);
        Ok(())
    }

    async fn stop(&self) {
        info!("[sound] stopped");
    }
}

pub struct LogVibration;

#[async_trait]
impl VibrationMotor for LogVibration {
    async fn vibrate(&self, pattern_ms: &[u64]) -> Result<()> {
        debug!("[vibration] pattern {:?}", pattern_ms);
        Ok(())
    }
}

pub struct LogFlasher;

#[async_trait]
impl ScreenFlasher for LogFlasher {
    async fn show_color(&self, color: &str) -> Result<()> {
        debug!("[flash] {}", color);
        Ok(())
    }

    async fn clear(&self) {
        debug!("[flash] cleared");
    }
}

pub struct LogPower;

impl PowerManager for LogPower {
    fn prevent_sleep(&self) {
        info!("[power] sleep prevented");
    }

    fn allow_sleep(&self) {
        info!("[power] sleep allowed");
    }
}

/// Geolocation stub for hosts without a positioning source: the watch never
/// yields a fix.
pub struct IdleGeoSource;

#[async_trait]
impl GeoSource for IdleGeoSource {
    async fn next_fix(&self) -> Option<LocationFix> {
        std::future::pending().await
    }
}
