//! Derived samples - the unit of data flowing between engine stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Device;

/// Rounds to three decimal places.
pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// A normalized heart rate in the three reporting units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    /// Beats per second. Already rounded or clamped by the deriver.
    pub per_sec: f64,
    /// Beats per minute, `round(per_sec * 60)`.
    pub per_min: f64,
    /// Beats per hour, `round(per_sec * 3600)`.
    pub per_hr: f64,
}

impl Rates {
    /// Builds the minute/hour rates from an already-normalized
    /// beats/sec value.
    pub fn from_per_sec(per_sec: f64) -> Self {
        Self {
            per_sec,
            per_min: (per_sec * 60.0).round(),
            per_hr: (per_sec * 3600.0).round(),
        }
    }

    /// The zero rate used for gap boundary samples.
    pub fn zero() -> Self {
        Self::from_per_sec(0.0)
    }
}

/// How a sample came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// Derived directly from a log event.
    Real,
    /// Zero-rate boundary inserted where the signal went missing.
    GapFill,
    /// Carry-forward row inserted by the fixed-cadence resampler.
    Resample,
}

impl SampleKind {
    /// String form used as the `code` of synthetic rows in storage.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::GapFill => "gap_fill",
            Self::Resample => "resample",
        }
    }
}

/// One point of the derived timeline.
///
/// Samples are produced once per run and never mutated afterwards; a
/// rerun that re-emits an ongoing session supersedes the previously
/// persisted rows instead of editing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    /// The session this sample belongs to. Strictly increasing per
    /// device, never reused.
    pub session_id: i64,
    /// Original event code, or the synthetic kind for inserted rows.
    pub code: String,
    pub kind: SampleKind,
    /// Normalized rates. `None` on start/end/counter rows.
    pub rates: Option<Rates>,
    /// Raw cumulative counter reading, on counter-code rows only.
    pub device_counter: Option<f64>,
    /// Part of a session still open at the end of the run.
    pub ongoing: bool,
    pub device: Device,
    pub log_version: String,
}
