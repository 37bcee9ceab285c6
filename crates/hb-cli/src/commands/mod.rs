//! CLI command implementations.

pub mod analyze;
pub mod ingest;
pub mod report;
pub mod status;

use anyhow::{Result, bail};
use hb_core::Device;

/// Parses a `type:id` device selector.
pub fn parse_device(spec: &str) -> Result<Device> {
    match spec.split_once(':') {
        Some((device_type, device_id)) if !device_type.is_empty() && !device_id.is_empty() => {
            Ok(Device::new(device_type, device_id))
        }
        _ => bail!("invalid device selector '{spec}', expected type:id"),
    }
}
