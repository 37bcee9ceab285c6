//! Raw log events as read from storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a monitoring device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    /// Device family, e.g. `hset` or `hphire`.
    pub device_type: String,
    /// Serial or unit identifier within the family.
    pub device_id: String,
}

impl Device {
    pub fn new(device_type: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            device_type: device_type.into(),
            device_id: device_id.into(),
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.device_type, self.device_id)
    }
}

/// One row of a device's event log.
///
/// Events are read-only inputs, ordered by `(timestamp, position)`.
/// Duplicate timestamps do occur; the segmenter decides which survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Storage position (rowid). Strictly increasing in ingest order;
    /// this is what the continuation cursor points at.
    pub position: i64,
    /// When the device logged the row.
    pub timestamp: DateTime<Utc>,
    /// Classification tag (start, end, measurement, counter, ...).
    pub code: String,
    /// Primary payload: raw rate value or cumulative counter reading.
    pub value1: f64,
    /// Unit key for measurement rows (`s`, `m`, `h`, ...).
    pub unit: Option<String>,
    /// Third payload column. Present in the log format, unused by the
    /// analysis.
    pub aux: Option<f64>,
    /// The device that produced the row.
    pub device: Device,
    /// Firmware/log format version the row was written with.
    pub log_version: String,
}
