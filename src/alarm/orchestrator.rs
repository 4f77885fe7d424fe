use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::camera::EvidenceCapture;
use crate::config::AppConfig;
use crate::delivery::{
    alert_update_endpoint, DeliveryQueue, ALERT_NOTIFICATION_ENDPOINT, PHOTO_UPLOAD_ENDPOINT,
};
use crate::location::LocationProvider;
use crate::models::alert::{Alert, AlertType, DeviceInfo};
use crate::models::delivery::{DeliveryPayload, HttpMethod};
use crate::models::location::Location;
use crate::models::photo::CameraFacing;
use crate::platform::{PowerManager, ScreenFlasher, SoundEngine, VibrationMotor};
use crate::store::{self, DbPool};

pub const DEFAULT_ALARM_SOUND: &str = "alarm_default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    Idle,
    Active,
}

#[derive(Debug, Clone)]
pub struct AlarmConfig {
    pub capture_interval: Duration,
    pub vibration_interval: Duration,
    pub vibration_pattern_ms: Vec<u64>,
    pub flash_interval: Duration,
    pub flash_colors: Vec<String>,
    pub alarm_sound: String,
    pub alert_log_capacity: i64,
    pub device_info: DeviceInfo,
}

impl AlarmConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            capture_interval: Duration::from_secs(config.photo_capture_interval_secs),
            vibration_interval: Duration::from_millis(config.vibration_interval_ms),
            vibration_pattern_ms: config.vibration_pattern_ms.clone(),
            flash_interval: Duration::from_millis(config.flash_interval_ms),
            flash_colors: config.flash_colors.clone(),
            alarm_sound: config.alarm_sound.clone(),
            alert_log_capacity: config.alert_log_capacity,
            device_info: DeviceInfo {
                device_id: config.device_id.clone(),
                model: config.device_model.clone(),
                os_version: config.os_version.clone(),
            },
        }
    }
}

/// The device effect surfaces the alarm drives, injected so tests can
/// substitute recorders.
pub struct Effects {
    pub sound: Arc<dyn SoundEngine>,
    pub vibration: Arc<dyn VibrationMotor>,
    pub flasher: Arc<dyn ScreenFlasher>,
    pub power: Arc<dyn PowerManager>,
}

struct ActiveAlarm {
    alert: Alert,
    cancel: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    current: Mutex<Option<ActiveAlarm>>,
    effects: Effects,
    capture: EvidenceCapture,
    locations: LocationProvider,
    queue: DeliveryQueue,
    pool: DbPool,
    config: AlarmConfig,
}

/// The theft-response state machine. Exactly one alarm may be active at a
/// time; `activate` and `deactivate` are guarded no-ops when called in the
/// wrong state. The orchestrator exclusively owns the current alert while it
/// is active.
#[derive(Clone)]
pub struct AlarmOrchestrator {
    inner: Arc<Inner>,
}

impl AlarmOrchestrator {
    pub fn new(
        effects: Effects,
        capture: EvidenceCapture,
        locations: LocationProvider,
        queue: DeliveryQueue,
        pool: DbPool,
        config: AlarmConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: Mutex::new(None),
                effects,
                capture,
                locations,
                queue,
                pool,
                config,
            }),
        }
    }

    pub fn state(&self) -> AlarmState {
        if self.inner.current.lock().unwrap().is_some() {
            AlarmState::Active
        } else {
            AlarmState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == AlarmState::Active
    }

    /// Snapshot of the current alert, if one is active.
    pub fn current_alert(&self) -> Option<Alert> {
        self.inner.current.lock().unwrap().as_ref().map(|a| a.alert.clone())
    }

    /// Fires the alarm and returns the new alert id. Returns `None` without
    /// doing anything if one is already active: the original alert keeps
    /// running and no duplicate notification goes out.
    pub async fn activate(&self, alert_type: AlertType) -> Result<Option<Uuid>> {
        if self.is_active() {
            warn!("Activation ({}) ignored; alarm already active", alert_type);
            return Ok(None);
        }

        let settings = match store::load_optimization_settings(&self.inner.pool).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Could not read optimization settings: {}; using defaults", e);
                Default::default()
            }
        };

        let location = self
            .inner
            .locations
            .last_known()
            .unwrap_or_else(|| Location::unknown(&self.inner.config.device_info.device_id));
        let alert = Alert::new(alert_type, location, self.inner.config.device_info.clone());
        let alert_id = alert.id;
        let (cancel_tx, cancel_rx) = watch::channel(false);

        {
            let mut current = self.inner.current.lock().unwrap();
            if current.is_some() {
                warn!("Activation ({}) raced another; keeping the original alarm", alert_type);
                return Ok(None);
            }
            *current = Some(ActiveAlarm {
                alert: alert.clone(),
                cancel: cancel_tx,
                tasks: Vec::new(),
            });
        }

        info!("Alarm activated ({}) -> alert {}", alert_type, alert_id);
        self.inner.effects.power.prevent_sleep();

        let mut tasks = vec![
            tokio::spawn(sound_task(self.inner.clone(), cancel_rx.clone())),
            tokio::spawn(vibration_task(self.inner.clone(), cancel_rx.clone())),
            tokio::spawn(flash_task(self.inner.clone(), cancel_rx.clone())),
        ];

        // The backend learns about the alarm before any evidence exists.
        let payload = DeliveryPayload::Json {
            body: serde_json::json!({
                "alert": &alert,
                "timestamp": Utc::now().to_rfc3339(),
                "priority": "high",
            }),
        };
        if let Err(e) = self
            .inner
            .queue
            .send(HttpMethod::Post, ALERT_NOTIFICATION_ENDPOINT, payload)
            .await
        {
            error!("Failed to send alert notification: {}", e);
        }

        // First capture is awaited so the photo list is seeded before
        // activate returns; later cycles run on their own timer.
        capture_cycle(&self.inner, alert_id, &cancel_rx).await;

        let period = Duration::from_secs(
            settings.capture_interval_secs(self.inner.config.capture_interval.as_secs()),
        );
        tasks.push(tokio::spawn(photo_task(
            self.inner.clone(),
            alert_id,
            cancel_rx,
            period,
        )));

        let leftover = {
            let mut current = self.inner.current.lock().unwrap();
            match current.as_mut() {
                Some(active) if active.alert.id == alert_id => {
                    active.tasks.extend(tasks);
                    Vec::new()
                }
                // Deactivated while startup was still in flight; cancel is
                // already set, so the loops release the hardware on their
                // own and only need to be waited out.
                _ => tasks,
            }
        };
        for task in leftover {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Effect loop ended abnormally: {}", e);
                }
            }
        }
        Ok(Some(alert_id))
    }

    /// Stops the alarm, finalizes the alert and persists it. No-op if idle.
    pub async fn deactivate(&self) -> Result<()> {
        let active = self.inner.current.lock().unwrap().take();
        let Some(mut active) = active else {
            debug!("Deactivation ignored; alarm already idle");
            return Ok(());
        };

        let _ = active.cancel.send(true);
        for task in active.tasks.drain(..) {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Effect loop ended abnormally: {}", e);
                }
            }
        }
        self.inner.effects.power.allow_sleep();

        let mut alert = active.alert;
        alert.is_resolved = true;
        info!(
            "Alarm deactivated -> alert {} with {} photos",
            alert.id,
            alert.photos.len()
        );

        store::append_alert(&self.inner.pool, &alert, self.inner.config.alert_log_capacity).await?;

        let payload = DeliveryPayload::Json {
            body: serde_json::json!({
                "alert": &alert,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        };
        self.inner
            .queue
            .send(HttpMethod::Put, &alert_update_endpoint(alert.id), payload)
            .await?;

        Ok(())
    }

    /// User-initiated self test: runs a manual-trigger alarm and schedules
    /// its own deactivation. Skipped entirely when an alarm is already
    /// active; the self test never tears down a live alarm.
    pub async fn test_alarm(&self, duration: Duration) -> Result<()> {
        let Some(alert_id) = self.activate(AlertType::ManualTrigger).await? else {
            warn!("Self test skipped; an alarm is already active");
            return Ok(());
        };

        let orchestrator = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // Only tear down the alarm this test started.
            if orchestrator.current_alert().map(|a| a.id) != Some(alert_id) {
                return;
            }
            if let Err(e) = orchestrator.deactivate().await {
                error!("Test alarm deactivation failed: {}", e);
            }
        });
        Ok(())
    }
}

/// One front+back capture pass. Photos are appended to the current alert in
/// capture order and handed to the delivery queue; a `None` capture is
/// skipped without altering cadence. Captures that land after deactivation
/// are discarded by the guard check.
async fn capture_cycle(inner: &Arc<Inner>, alert_id: Uuid, cancel: &watch::Receiver<bool>) {
    if *cancel.borrow() {
        return;
    }

    let (front, back) = futures::join!(
        inner.capture.capture(CameraFacing::Front),
        inner.capture.capture(CameraFacing::Back),
    );

    for photo in [front, back].into_iter().flatten() {
        let kept = {
            let mut current = inner.current.lock().unwrap();
            match current.as_mut() {
                Some(active) if active.alert.id == alert_id && !*cancel.borrow() => {
                    active.alert.photos.push(photo.clone());
                    true
                }
                _ => false,
            }
        };
        if !kept {
            debug!("Dropping capture {}; alarm no longer active", photo.id);
            continue;
        }

        let payload = DeliveryPayload::PhotoUpload { photo, alert_id };
        if let Err(e) = inner
            .queue
            .send(HttpMethod::Post, PHOTO_UPLOAD_ENDPOINT, payload)
            .await
        {
            error!("Failed to hand photo to delivery queue: {}", e);
        }
    }
}

async fn photo_task(
    inner: Arc<Inner>,
    alert_id: Uuid,
    mut cancel: watch::Receiver<bool>,
    period: Duration,
) {
    // The seed capture already ran; first tick comes one period later.
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            // The wait_for result is dropped inside the arm; holding its
            // borrow guard across the other arm would pin `cancel`.
            _ = async { let _ = cancel.wait_for(|stop| *stop).await; } => break,
            _ = ticker.tick() => {
                if *cancel.borrow() {
                    break;
                }
                capture_cycle(&inner, alert_id, &cancel).await;
            }
        }
    }
}

async fn sound_task(inner: Arc<Inner>, mut cancel: watch::Receiver<bool>) {
    let configured = inner.config.alarm_sound.as_str();
    let loaded = match inner.effects.sound.play_looping(configured).await {
        Ok(()) => true,
        Err(e) => {
            error!("Alarm sound '{}' failed to load: {}; trying default", configured, e);
            match inner.effects.sound.play_looping(DEFAULT_ALARM_SOUND).await {
                Ok(()) => true,
                Err(e) => {
                    // Sound failure never aborts the other effects.
                    error!("Default alarm sound unavailable: {}", e);
                    false
                }
            }
        }
    };
    if !loaded {
        return;
    }

    let _ = cancel.wait_for(|stop| *stop).await;
    inner.effects.sound.stop().await;
}

async fn vibration_task(inner: Arc<Inner>, mut cancel: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.config.vibration_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = async { let _ = cancel.wait_for(|stop| *stop).await; } => break,
            _ = ticker.tick() => {
                if *cancel.borrow() {
                    break;
                }
                if let Err(e) = inner
                    .effects
                    .vibration
                    .vibrate(&inner.config.vibration_pattern_ms)
                    .await
                {
                    error!("Vibration failed: {}", e);
                }
            }
        }
    }
}

async fn flash_task(inner: Arc<Inner>, mut cancel: watch::Receiver<bool>) {
    let colors = &inner.config.flash_colors;
    if colors.is_empty() {
        return;
    }

    let mut ticker = tokio::time::interval(inner.config.flash_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut idx = 0usize;
    loop {
        tokio::select! {
            _ = async { let _ = cancel.wait_for(|stop| *stop).await; } => break,
            _ = ticker.tick() => {
                if *cancel.borrow() {
                    break;
                }
                let color = &colors[idx % colors.len()];
                idx += 1;
                if let Err(e) = inner.effects.flasher.show_color(color).await {
                    error!("Screen flash failed: {}", e);
                }
            }
        }
    }
    inner.effects.flasher.clear().await;
}

#[cfg(test)]
pub mod test_util {
    use super::*;
    use crate::camera::test_util::StubCamera;
    use crate::camera::{CameraPort, UnavailableCamera};
    use crate::delivery::test_util::{test_config, FlakyTransport};
    use crate::location::test_util::ScriptedSource;
    use crate::location::LocationConfig;
    use crate::platform::test_util::{
        CountingVibration, RecordingFlasher, RecordingPower, RecordingSound,
    };
    use crate::store::test_util::temp_pool;

    pub struct TestFixture {
        pub _dir: tempfile::TempDir,
        pub pool: DbPool,
        pub orchestrator: AlarmOrchestrator,
        pub transport: Arc<FlakyTransport>,
        pub sound: Arc<RecordingSound>,
        pub vibration: Arc<CountingVibration>,
        pub flasher: Arc<RecordingFlasher>,
        pub power: Arc<RecordingPower>,
        pub camera: Arc<StubCamera>,
    }

    pub fn test_alarm_config() -> AlarmConfig {
        AlarmConfig {
            capture_interval: Duration::from_secs(10),
            vibration_interval: Duration::from_secs(1),
            vibration_pattern_ms: vec![0, 500],
            flash_interval: Duration::from_secs(1),
            flash_colors: vec!["#FF0000".into(), "#FFFFFF".into(), "#0000FF".into()],
            alarm_sound: "custom_siren".into(),
            alert_log_capacity: 10,
            device_info: DeviceInfo {
                device_id: "dev-1".into(),
                model: "test".into(),
                os_version: "1.0".into(),
            },
        }
    }

    pub async fn fixture() -> TestFixture {
        fixture_with(test_alarm_config(), RecordingSound::new()).await
    }

    pub async fn fixture_with(
        config: AlarmConfig,
        sound: Arc<RecordingSound>,
    ) -> TestFixture {
        let (dir, pool) = temp_pool().await;
        let transport = FlakyTransport::reliable();
        let queue = DeliveryQueue::new(transport.clone(), pool.clone(), test_config());
        let locations = LocationProvider::new(
            ScriptedSource::empty(),
            queue.clone(),
            pool.clone(),
            LocationConfig {
                accuracy_threshold_m: 50.0,
                history_capacity: 10,
                device_id: "dev-1".into(),
            },
        );
        let camera = StubCamera::new();
        let capture = EvidenceCapture::new(camera.clone(), locations.clone(), "dev-1".into());
        let vibration = CountingVibration::new();
        let flasher = RecordingFlasher::new();
        let power = RecordingPower::new();
        let effects = Effects {
            sound: sound.clone(),
            vibration: vibration.clone(),
            flasher: flasher.clone(),
            power: power.clone(),
        };
        let orchestrator = AlarmOrchestrator::new(
            effects,
            capture,
            locations,
            queue,
            pool.clone(),
            config,
        );

        // Pause time only now: the database connection must open while the
        // clock still runs (see store::test_util::temp_pool). Tests advance
        // the clock from here on, manually or through auto-advance.
        tokio::time::pause();

        // Keep a short timer pending at all times. Database work completes on
        // sqlx's sqlite worker thread, which the paused clock cannot see:
        // when a task waits on the pool while another holds the connection,
        // auto-advance would otherwise jump straight to the 30s acquire
        // timeout instead of granting the worker thread real time to reply.
        // With this ticker, auto-advance moves in 1ms steps and each park
        // cycle yields a slice of real time, so in-flight queries and
        // connection returns finish long before any acquire deadline.
        tokio::spawn(async {
            loop {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        TestFixture {
            _dir: dir,
            pool,
            orchestrator,
            transport,
            sound,
            vibration,
            flasher,
            power,
            camera,
        }
    }

    /// Same fixture, but with the given camera behind the capture adapter.
    pub async fn fixture_with_camera(camera: Arc<dyn CameraPort>) -> TestFixture {
        let mut fx = fixture().await;
        let locations = LocationProvider::new(
            ScriptedSource::empty(),
            DeliveryQueue::new(fx.transport.clone(), fx.pool.clone(), test_config()),
            fx.pool.clone(),
            LocationConfig {
                accuracy_threshold_m: 50.0,
                history_capacity: 10,
                device_id: "dev-1".into(),
            },
        );
        let capture = EvidenceCapture::new(camera, locations.clone(), "dev-1".into());
        let effects = Effects {
            sound: fx.sound.clone(),
            vibration: fx.vibration.clone(),
            flasher: fx.flasher.clone(),
            power: fx.power.clone(),
        };
        fx.orchestrator = AlarmOrchestrator::new(
            effects,
            capture,
            locations,
            DeliveryQueue::new(fx.transport.clone(), fx.pool.clone(), test_config()),
            fx.pool.clone(),
            test_alarm_config(),
        );
        fx
    }

    /// Same fixture, but every capture returns `None`.
    pub async fn fixture_without_camera() -> TestFixture {
        fixture_with_camera(Arc::new(UnavailableCamera)).await
    }

    /// Polls until `predicate` holds, advancing the (paused) clock via the
    /// sleeps in between.
    pub async fn wait_until(mut predicate: impl FnMut() -> bool) {
        for _ in 0..2_000 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("condition not reached in time");
    }
}
