//! Fixed-cadence resampling of the rate timeline.
//!
//! The persisted rate series should have a point at least every
//! `sample_interval_sec` seconds so downstream plots do not interpolate
//! across sparse stretches. Intervals longer than the cadence are padded
//! with carry-forward rows; session boundaries are never padded across.

use chrono::Duration;

use crate::config::{AnalysisConfig, CodeKind};
use crate::sample::{Sample, SampleKind};

/// Copies the first measurement's rates onto the session start row, so
/// the timeline begins at the start marker instead of the first reading.
pub fn backfill_start_rates(samples: &mut [Sample], config: &AnalysisConfig) {
    for i in 1..samples.len() {
        if !matches!(config.classify(&samples[i - 1].code), CodeKind::Start) {
            continue;
        }
        if matches!(config.classify(&samples[i].code), CodeKind::Measurement(_)) {
            samples[i - 1].rates = samples[i].rates;
        }
    }
}

fn is_boundary(code: &str, config: &AnalysisConfig) -> bool {
    matches!(config.classify(code), CodeKind::Start | CodeKind::End)
}

/// Pads sparse intervals with carry-forward rows at the configured
/// cadence.
///
/// For an interval of `delta` seconds, `floor(delta/interval) - 1` rows
/// are inserted, each repeating the preceding row's rates. Intervals
/// touching a start or end marker are skipped.
pub fn resample(samples: Vec<Sample>, config: &AnalysisConfig) -> Vec<Sample> {
    let interval = config.sample_interval_sec;
    let step_ms = (interval * 1000.0).round() as i64;
    let mut inserted = Vec::new();

    for pair in samples.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if is_boundary(&prev.code, config) || is_boundary(&next.code, config) {
            continue;
        }
        let delta = (next.timestamp - prev.timestamp).num_milliseconds() as f64 / 1000.0;
        if delta <= interval {
            continue;
        }
        let count = (delta / interval).floor() as i64 - 1;
        for k in 1..=count {
            inserted.push(Sample {
                timestamp: prev.timestamp + Duration::milliseconds(step_ms * k),
                session_id: prev.session_id,
                code: SampleKind::Resample.as_str().to_string(),
                kind: SampleKind::Resample,
                rates: prev.rates,
                device_counter: None,
                ongoing: prev.ongoing,
                device: prev.device.clone(),
                log_version: prev.log_version.clone(),
            });
        }
    }

    if inserted.is_empty() {
        return samples;
    }
    let mut merged = samples;
    merged.extend(inserted);
    merged.sort_by_key(|s| s.timestamp);
    merged
}
