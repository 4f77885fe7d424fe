use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::alarm::AlarmOrchestrator;
use crate::config::AppConfig;
use crate::crypto::EncryptionService;
use crate::models::alert::AlertType;
use crate::store::{self, DbPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    AwaitingTaps,
    AwaitingPin,
    Unlocked,
    LockedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    /// Tap landed outside every corner region, or the gate is past the tap
    /// phase. Does not advance or reset the counter.
    Ignored,
    Counted(u32),
    PinEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    Unlocked,
    /// First-ever use: the entered value became the stored PIN.
    PinCreated,
    WrongPin { attempts_left: u32 },
    /// Attempts exhausted; the alarm has been triggered.
    LockedOut,
    InvalidFormat,
    NotAwaitingPin,
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub required_taps: u32,
    pub tap_window: Duration,
    pub corner_region_px: f64,
    pub max_pin_attempts: u32,
    pub pin_length: usize,
}

impl GateConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            required_taps: config.required_corner_taps,
            tap_window: Duration::from_secs(config.tap_window_secs),
            corner_region_px: config.corner_region_px,
            max_pin_attempts: config.max_pin_attempts,
            pin_length: config.pin_length,
        }
    }
}

struct Session {
    state: GateState,
    taps: u32,
    window_start: Option<Instant>,
    pin_attempts: u32,
}

impl Session {
    fn fresh() -> Self {
        Self {
            state: GateState::AwaitingTaps,
            taps: 0,
            window_start: None,
            pin_attempts: 0,
        }
    }
}

/// Hidden entry mechanism: a corner-tap counter feeding PIN verification.
/// Exhausting PIN attempts is not an error path; it escalates straight into
/// an unauthorized-access alarm.
pub struct SecretAccessGate {
    config: GateConfig,
    crypto: Arc<dyn EncryptionService>,
    pool: DbPool,
    orchestrator: AlarmOrchestrator,
    session: Mutex<Session>,
}

impl SecretAccessGate {
    pub fn new(
        config: GateConfig,
        crypto: Arc<dyn EncryptionService>,
        pool: DbPool,
        orchestrator: AlarmOrchestrator,
    ) -> Self {
        Self {
            config,
            crypto,
            pool,
            orchestrator,
            session: Mutex::new(Session::fresh()),
        }
    }

    pub async fn state(&self) -> GateState {
        self.session.lock().await.state
    }

    /// Starts a new session: back to tap counting with a clean attempt
    /// counter, clearing a previous lockout.
    pub async fn reset_session(&self) {
        *self.session.lock().await = Session::fresh();
    }

    fn in_corner(&self, x: f64, y: f64, width: f64, height: f64) -> bool {
        let r = self.config.corner_region_px;
        let near_left = x >= 0.0 && x <= r;
        let near_right = x >= width - r && x <= width;
        let near_top = y >= 0.0 && y <= r;
        let near_bottom = y >= height - r && y <= height;
        (near_left || near_right) && (near_top || near_bottom)
    }

    /// Feeds one screen tap. Only taps inside a corner region count; the
    /// counter resets when the required count is not reached within the
    /// rolling window.
    pub async fn register_tap(&self, x: f64, y: f64, width: f64, height: f64) -> TapOutcome {
        let mut session = self.session.lock().await;
        if session.state != GateState::AwaitingTaps {
            return TapOutcome::Ignored;
        }
        if !self.in_corner(x, y, width, height) {
            return TapOutcome::Ignored;
        }

        let now = Instant::now();
        if let Some(start) = session.window_start {
            if now.duration_since(start) > self.config.tap_window {
                debug!("Tap window expired; counter reset");
                session.taps = 0;
                session.window_start = None;
            }
        }

        if session.taps == 0 {
            session.window_start = Some(now);
        }
        session.taps += 1;

        if session.taps >= self.config.required_taps {
            info!("Corner-tap sequence complete; awaiting PIN");
            session.state = GateState::AwaitingPin;
            session.taps = 0;
            session.window_start = None;
            return TapOutcome::PinEntry;
        }
        TapOutcome::Counted(session.taps)
    }

    /// Verifies an entered PIN. On first-ever use the entered value becomes
    /// the stored PIN. Reaching the attempt limit locks the session and
    /// fires the alarm.
    pub async fn submit_pin(&self, pin: &str) -> Result<PinOutcome> {
        let mut session = self.session.lock().await;
        if session.state != GateState::AwaitingPin {
            return Ok(PinOutcome::NotAwaitingPin);
        }

        // Malformed input is rejected before verification and does not
        // consume an attempt.
        if pin.len() != self.config.pin_length || !pin.chars().all(|c| c.is_ascii_digit()) {
            return Ok(PinOutcome::InvalidFormat);
        }

        let stored = store::load_pin(&self.pool).await?;
        let Some(stored) = stored else {
            let encrypted = self.crypto.encrypt(pin);
            store::store_pin(&self.pool, &encrypted).await?;
            session.state = GateState::Unlocked;
            session.pin_attempts = 0;
            info!("PIN created on first use; access granted");
            return Ok(PinOutcome::PinCreated);
        };

        if self.crypto.verify_pin(pin, &stored) {
            session.state = GateState::Unlocked;
            session.pin_attempts = 0;
            info!("PIN verified; access granted");
            return Ok(PinOutcome::Unlocked);
        }

        session.pin_attempts += 1;
        if session.pin_attempts >= self.config.max_pin_attempts {
            warn!(
                "PIN attempts exhausted ({}); triggering unauthorized-access alarm",
                session.pin_attempts
            );
            session.state = GateState::LockedOut;
            session.pin_attempts = 0;
            drop(session);

            self.orchestrator
                .activate(AlertType::UnauthorizedAccess)
                .await?;
            return Ok(PinOutcome::LockedOut);
        }

        let attempts_left = self.config.max_pin_attempts - session.pin_attempts;
        debug!("Wrong PIN; {} attempts left", attempts_left);
        Ok(PinOutcome::WrongPin { attempts_left })
    }
}
