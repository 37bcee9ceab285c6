//! Analysis configuration.
//!
//! All constants the engine depends on (event code lists, the unit
//! table, per-class rate caps, the resampling interval and the gap
//! threshold) live in one immutable [`AnalysisConfig`] value that is
//! passed explicitly to every stage. Nothing in the engine reads
//! ambient or global state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// What an event code means to the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    /// Opens a new recording session.
    Start,
    /// Closes the current session.
    End,
    /// A rate measurement for the device class with this index.
    Measurement(usize),
    /// The device's own cumulative beat counter.
    Counter,
    /// Not a code this configuration knows about.
    Unknown,
}

/// Immutable analysis constants.
///
/// Defaults mirror the firmware log dialect the supported devices emit;
/// deployments override them through the `[analysis]` config table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Unit key on a measurement event to the number of seconds it denotes.
    pub unit_seconds: HashMap<String, f64>,
    /// Codes that open a session.
    pub start_codes: Vec<String>,
    /// Codes that close a session.
    pub end_codes: Vec<String>,
    /// Measurement codes, one per device class. The index into this list
    /// is the device class and selects the cap in `rate_caps`.
    pub measurement_codes: Vec<String>,
    /// Code carrying the device's cumulative beat counter.
    pub counter_code: String,
    /// Maximum plausible beats/sec per device class; higher derived
    /// values clamp to the class's cap.
    pub rate_caps: Vec<f64>,
    /// Target cadence of the resampled rate timeline, in seconds.
    pub sample_interval_sec: f64,
    /// Consecutive-timestamp delta above which a gap is patched, in seconds.
    pub gap_threshold_sec: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            unit_seconds: [
                ("s".to_string(), 1.0),
                ("m".to_string(), 60.0),
                ("h".to_string(), 3600.0),
                ("SEC".to_string(), 1.0),
                ("MIN".to_string(), 60.0),
            ]
            .into_iter()
            .collect(),
            start_codes: vec!["1.7.0.0".to_string(), "170".to_string()],
            end_codes: vec!["1.7.1.0".to_string(), "171".to_string()],
            measurement_codes: vec!["1.7.0.1".to_string(), "200".to_string()],
            counter_code: "1.7.0.2".to_string(),
            rate_caps: vec![5.0, 6.0],
            sample_interval_sec: 10.0,
            gap_threshold_sec: 20.0,
        }
    }
}

impl AnalysisConfig {
    /// Classifies an event code.
    ///
    /// Start and end codes take precedence over measurement codes, so a
    /// misconfigured overlap fails towards session boundaries rather
    /// than dropped sessions.
    pub fn classify(&self, code: &str) -> CodeKind {
        if self.start_codes.iter().any(|c| c == code) {
            CodeKind::Start
        } else if self.end_codes.iter().any(|c| c == code) {
            CodeKind::End
        } else if let Some(class) = self.measurement_codes.iter().position(|c| c == code) {
            CodeKind::Measurement(class)
        } else if self.counter_code == code {
            CodeKind::Counter
        } else {
            CodeKind::Unknown
        }
    }

    /// Returns the rate cap for a device class.
    pub fn cap_for(&self, class: usize) -> f64 {
        self.rate_caps[class]
    }

    /// Checks structural soundness before a run.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.measurement_codes.is_empty() {
            return Err(AnalysisError::InvalidConfig {
                reason: "no measurement codes configured".to_string(),
            });
        }
        if self.measurement_codes.len() != self.rate_caps.len() {
            return Err(AnalysisError::InvalidConfig {
                reason: format!(
                    "{} measurement codes but {} rate caps",
                    self.measurement_codes.len(),
                    self.rate_caps.len()
                ),
            });
        }
        if self.unit_seconds.is_empty() {
            return Err(AnalysisError::InvalidConfig {
                reason: "empty unit table".to_string(),
            });
        }
        if self.unit_seconds.values().any(|&s| s <= 0.0) {
            return Err(AnalysisError::InvalidConfig {
                reason: "unit table contains a non-positive seconds value".to_string(),
            });
        }
        if self.sample_interval_sec <= 0.0 {
            return Err(AnalysisError::InvalidConfig {
                reason: format!("non-positive sample interval: {}", self.sample_interval_sec),
            });
        }
        if self.gap_threshold_sec <= 0.0 {
            return Err(AnalysisError::InvalidConfig {
                reason: format!("non-positive gap threshold: {}", self.gap_threshold_sec),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn classify_default_codes() {
        let config = AnalysisConfig::default();
        assert_eq!(config.classify("1.7.0.0"), CodeKind::Start);
        assert_eq!(config.classify("170"), CodeKind::Start);
        assert_eq!(config.classify("1.7.1.0"), CodeKind::End);
        assert_eq!(config.classify("1.7.0.1"), CodeKind::Measurement(0));
        assert_eq!(config.classify("200"), CodeKind::Measurement(1));
        assert_eq!(config.classify("1.7.0.2"), CodeKind::Counter);
        assert_eq!(config.classify("9.9.9.9"), CodeKind::Unknown);
    }

    #[test]
    fn validate_rejects_cap_count_mismatch() {
        let config = AnalysisConfig {
            rate_caps: vec![5.0],
            ..AnalysisConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig { .. }));
    }

    #[test]
    fn validate_rejects_bad_thresholds() {
        let config = AnalysisConfig {
            gap_threshold_sec: 0.0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AnalysisConfig {
            sample_interval_sec: -1.0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
