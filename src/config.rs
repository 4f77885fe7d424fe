use anyhow::Result;
use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Backend
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub send_max_attempts: u32,
    pub send_backoff_base_ms: u64,
    pub delivery_queue_capacity: i64,
    pub drain_interval_secs: u64,
    // Local storage
    pub database_url: String,
    pub alert_log_capacity: i64,
    pub location_history_capacity: i64,
    // Location acceptance
    pub location_accuracy_threshold_m: f64,
    // Alarm effects
    pub photo_capture_interval_secs: u64,
    pub vibration_interval_ms: u64,
    pub vibration_pattern_ms: Vec<u64>,
    pub flash_interval_ms: u64,
    pub flash_colors: Vec<String>,
    pub alarm_sound: String,
    // Secret-access gate
    pub required_corner_taps: u32,
    pub tap_window_secs: u64,
    pub corner_region_px: f64,
    pub max_pin_attempts: u32,
    pub pin_length: usize,
    // Device identity
    pub device_id: String,
    pub device_model: String,
    pub os_version: String,
    pub log_level: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let api_base_url = env_or("API_BASE_URL", "https://api.theftguard.local");
        let request_timeout_secs = env_parse("REQUEST_TIMEOUT_SECS", 30);
        let send_max_attempts = env_parse("SEND_MAX_ATTEMPTS", 3);
        let send_backoff_base_ms = env_parse("SEND_BACKOFF_BASE_MS", 1_000);
        let delivery_queue_capacity = env_parse("DELIVERY_QUEUE_CAPACITY", 200);
        let drain_interval_secs = env_parse("DRAIN_INTERVAL_SECS", 60);

        let data_dir = env_or("DATA_DIR", ".");
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/theftguard.db?mode=rwc", data_dir));

        let alert_log_capacity = env_parse("ALERT_LOG_CAPACITY", 50);
        let location_history_capacity = env_parse("LOCATION_HISTORY_CAPACITY", 100);
        let location_accuracy_threshold_m = env_parse("LOCATION_ACCURACY_THRESHOLD_M", 100.0);

        let photo_capture_interval_secs = env_parse("PHOTO_CAPTURE_INTERVAL_SECS", 10);
        let vibration_interval_ms = env_parse("VIBRATION_INTERVAL_MS", 1_000);
        let vibration_pattern_ms = env_or("VIBRATION_PATTERN_MS", "0,500,200,500")
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        let flash_interval_ms = env_parse("FLASH_INTERVAL_MS", 500);
        let flash_colors = env_or("FLASH_COLORS", "#FF0000,#FFFFFF,#0000FF")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let alarm_sound = env_or("ALARM_SOUND", "alarm_default");

        let required_corner_taps = env_parse("REQUIRED_CORNER_TAPS", 5);
        let tap_window_secs = env_parse("TAP_WINDOW_SECS", 10);
        let corner_region_px = env_parse("CORNER_REGION_PX", 100.0);
        let max_pin_attempts = env_parse("MAX_PIN_ATTEMPTS", 3);
        let pin_length = env_parse("PIN_LENGTH", 4);

        let device_id = env_or("DEVICE_ID", "dev-device");
        let device_model = env_or("DEVICE_MODEL", "unknown");
        let os_version = env_or("OS_VERSION", "unknown");
        let log_level = env_or("LOG_LEVEL", "info");

        Ok(Self {
            api_base_url,
            request_timeout_secs,
            send_max_attempts,
            send_backoff_base_ms,
            delivery_queue_capacity,
            drain_interval_secs,
            database_url,
            alert_log_capacity,
            location_history_capacity,
            location_accuracy_threshold_m,
            photo_capture_interval_secs,
            vibration_interval_ms,
            vibration_pattern_ms,
            flash_interval_ms,
            flash_colors,
            alarm_sound,
            required_corner_taps,
            tap_window_secs,
            corner_region_px,
            max_pin_attempts,
            pin_length,
            device_id,
            device_model,
            os_version,
            log_level,
        })
    }
}
