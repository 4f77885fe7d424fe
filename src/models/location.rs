use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A geographic fix as reported by the platform location source.
///
/// `accuracy` is in meters, lower is better. The all-zero value is the
/// "unknown" sentinel and is only emitted where a concrete location field is
/// mandatory; internal code passes `Option<Location>` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub altitude: f64,
    pub speed: f64,
    pub heading: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub address: Option<String>,
    pub device_id: String,
}

impl Location {
    /// Sentinel for "no location known". Consumers must check `is_unknown`
    /// before treating coordinates as a real fix.
    pub fn unknown(device_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            latitude: 0.0,
            longitude: 0.0,
            accuracy: 0.0,
            altitude: 0.0,
            speed: 0.0,
            heading: 0.0,
            timestamp: Utc::now(),
            address: None,
            device_id: device_id.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0 && self.accuracy == 0.0
    }

    pub fn in_valid_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A raw reading from the platform before validation. Optional fields mirror
/// what real GPS hardware actually omits on a degraded fix.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl LocationFix {
    pub fn into_location(self, device_id: &str) -> Location {
        Location {
            id: Uuid::new_v4(),
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            altitude: self.altitude.unwrap_or(0.0),
            speed: self.speed.unwrap_or(0.0),
            heading: self.heading.unwrap_or(0.0),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            address: None,
            device_id: device_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_unknown() {
        let loc = Location::unknown("dev-1");
        assert!(loc.is_unknown());
        assert!(loc.in_valid_range());
    }

    #[test]
    fn equator_fix_with_accuracy_is_not_unknown() {
        let mut loc = Location::unknown("dev-1");
        loc.accuracy = 5.0;
        assert!(!loc.is_unknown());
    }

    #[test]
    fn range_check_rejects_bad_coordinates() {
        let mut loc = Location::unknown("dev-1");
        loc.latitude = 91.0;
        assert!(!loc.in_valid_range());
        loc.latitude = 45.0;
        loc.longitude = -180.5;
        assert!(!loc.in_valid_range());
    }
}
