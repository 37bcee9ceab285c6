//! Rate derivation.
//!
//! Converts retained events into [`Sample`]s: measurement rows become
//! normalized beats/sec (with device-class clamping), counter rows keep
//! the raw cumulative reading, start/end rows pass through with no rate.

use crate::config::{AnalysisConfig, CodeKind};
use crate::error::AnalysisError;
use crate::sample::{Rates, Sample, SampleKind, round3};
use crate::segment::SegmentedEvent;

/// Derives one sample per retained event.
///
/// Fails on the first measurement row whose unit key is missing from
/// the configured unit table; per the error contract that aborts the
/// whole device run.
pub fn derive_samples(
    rows: Vec<SegmentedEvent>,
    config: &AnalysisConfig,
) -> Result<Vec<Sample>, AnalysisError> {
    rows.into_iter()
        .map(|row| {
            let (rates, counter) = match config.classify(&row.event.code) {
                CodeKind::Measurement(class) => {
                    (Some(derive_rates(&row, class, config)?), None)
                }
                CodeKind::Counter => (None, Some(row.event.value1)),
                CodeKind::Start | CodeKind::End | CodeKind::Unknown => (None, None),
            };
            Ok(Sample {
                timestamp: row.event.timestamp,
                session_id: row.session_id,
                code: row.event.code,
                kind: SampleKind::Real,
                rates,
                device_counter: counter,
                ongoing: false,
                device: row.event.device,
                log_version: row.event.log_version,
            })
        })
        .collect()
}

fn derive_rates(
    row: &SegmentedEvent,
    class: usize,
    config: &AnalysisConfig,
) -> Result<Rates, AnalysisError> {
    let unit = row.event.unit.as_deref().ok_or(AnalysisError::MissingUnit {
        position: row.event.position,
    })?;
    let unit_seconds =
        config
            .unit_seconds
            .get(unit)
            .ok_or_else(|| AnalysisError::UnknownUnit {
                unit: unit.to_string(),
                position: row.event.position,
            })?;

    let per_sec = row.event.value1 / unit_seconds;
    let cap = config.cap_for(class);
    // Clamped values take the cap verbatim; everything else is rounded
    // to three decimals before the minute/hour rates are derived.
    let per_sec = if per_sec > cap { cap } else { round3(per_sec) };
    Ok(Rates::from_per_sec(per_sec))
}
