use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::Location;
use super::photo::Photo;

/// What set the alarm off. Immutable once an alert is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    TheftAttempt,
    UnauthorizedAccess,
    ManualTrigger,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::TheftAttempt => write!(f, "theft_attempt"),
            AlertType::UnauthorizedAccess => write!(f, "unauthorized_access"),
            AlertType::ManualTrigger => write!(f, "manual_trigger"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub model: String,
    pub os_version: String,
}

/// A record of one theft-response activation. Created unresolved with an
/// empty photo list, mutated in place while the alarm is active, then
/// resolved and persisted at deactivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub timestamp: DateTime<Utc>,
    pub location: Location,
    pub photos: Vec<Photo>,
    pub device_info: DeviceInfo,
    pub is_resolved: bool,
}

impl Alert {
    pub fn new(alert_type: AlertType, location: Location, device_info: DeviceInfo) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type,
            timestamp: Utc::now(),
            location,
            photos: Vec::new(),
            device_info,
            is_resolved: false,
        }
    }
}

/// Aggregates over the alert log, read by the companion UI. Pure read, no
/// side effects.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStats {
    pub total_alerts: usize,
    pub last_alert_time: Option<DateTime<Utc>>,
    pub total_photos: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&AlertType::UnauthorizedAccess).unwrap(),
            "\"unauthorized_access\""
        );
        assert_eq!(
            serde_json::to_string(&AlertType::ManualTrigger).unwrap(),
            "\"manual_trigger\""
        );
    }

    #[test]
    fn new_alert_starts_unresolved_and_empty() {
        let info = DeviceInfo {
            device_id: "dev-1".into(),
            model: "test".into(),
            os_version: "1.0".into(),
        };
        let alert = Alert::new(AlertType::TheftAttempt, Location::unknown("dev-1"), info);
        assert!(!alert.is_resolved);
        assert!(alert.photos.is_empty());
    }
}
