//! Error types for the analysis engine.

use thiserror::Error;

/// Errors that abort a device's analysis run.
///
/// When any of these is returned, nothing from the run may be committed;
/// the continuation cursor stays where it was and the next run retries
/// from the same position.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    /// A measurement event carried a unit key that is not in the
    /// configured unit table.
    #[error("unknown rate unit '{unit}' at position {position}")]
    UnknownUnit { unit: String, position: i64 },

    /// A measurement event was missing its unit column entirely.
    #[error("measurement event at position {position} has no unit value")]
    MissingUnit { position: i64 },

    /// An hour bucket mixed rows from more than one device identity or
    /// log version. This signals a segmentation defect upstream and is
    /// fatal for the run rather than silently patched.
    #[error(
        "inconsistent {field} within hour bucket (session {session_id}, hour {hour}): {left} vs {right}"
    )]
    MixedDeviceIdentity {
        field: &'static str,
        session_id: i64,
        hour: u32,
        left: String,
        right: String,
    },

    /// The analysis configuration is structurally invalid.
    #[error("invalid analysis configuration: {reason}")]
    InvalidConfig { reason: String },
}
