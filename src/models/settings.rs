use serde::{Deserialize, Serialize};

/// Power-saving knobs read by the orchestrator when it starts the photo
/// capture loop. Persisted in the store; defaults apply on first read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationSettings {
    pub low_power_mode: bool,
    #[serde(default)]
    pub capture_interval_override_secs: Option<u64>,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            low_power_mode: false,
            capture_interval_override_secs: None,
        }
    }
}

impl OptimizationSettings {
    /// Effective capture interval: an explicit override wins, otherwise the
    /// configured default, doubled under low power.
    pub fn capture_interval_secs(&self, default_secs: u64) -> u64 {
        if let Some(secs) = self.capture_interval_override_secs {
            return secs.max(1);
        }
        if self.low_power_mode {
            default_secs.saturating_mul(2)
        } else {
            default_secs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_power_doubles_interval() {
        let settings = OptimizationSettings {
            low_power_mode: true,
            capture_interval_override_secs: None,
        };
        assert_eq!(settings.capture_interval_secs(10), 20);
    }

    #[test]
    fn override_wins_over_low_power() {
        let settings = OptimizationSettings {
            low_power_mode: true,
            capture_interval_override_secs: Some(7),
        };
        assert_eq!(settings.capture_interval_secs(10), 7);
    }
}
