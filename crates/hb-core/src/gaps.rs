//! Gap patching.
//!
//! When consecutive retained rows are further apart than the configured
//! threshold, the signal was lost rather than merely sparse. Exactly one
//! zero-rate boundary sample is inserted per gap, at
//! `previous_timestamp + threshold`; the resampler later pads the rest
//! of the gap at cadence with that zero rate.

use chrono::Duration;

use crate::config::{AnalysisConfig, CodeKind};
use crate::sample::{Rates, Sample, SampleKind};

fn seconds_between(earlier: &Sample, later: &Sample) -> f64 {
    (later.timestamp - earlier.timestamp).num_milliseconds() as f64 / 1000.0
}

/// Inserts zero-rate boundary samples into the derived series.
///
/// A gap ending on a start code is the idle stretch between two
/// recordings, not lost signal, and is left alone.
pub fn fill_gaps(samples: Vec<Sample>, config: &AnalysisConfig) -> Vec<Sample> {
    let threshold = config.gap_threshold_sec;
    let mut inserted = Vec::new();

    for pair in samples.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if seconds_between(prev, next) <= threshold {
            continue;
        }
        if matches!(config.classify(&next.code), CodeKind::Start) {
            continue;
        }
        let timestamp =
            prev.timestamp + Duration::milliseconds((threshold * 1000.0).round() as i64);
        tracing::debug!(
            session_id = next.session_id,
            %timestamp,
            "patching signal gap with zero-rate boundary"
        );
        // Session, identity and ongoing flag come from the row after the
        // gap: that is the context the boundary belongs to.
        inserted.push(Sample {
            timestamp,
            session_id: next.session_id,
            code: SampleKind::GapFill.as_str().to_string(),
            kind: SampleKind::GapFill,
            rates: Some(Rates::zero()),
            device_counter: None,
            ongoing: next.ongoing,
            device: next.device.clone(),
            log_version: next.log_version.clone(),
        });
    }

    if inserted.is_empty() {
        return samples;
    }
    let mut merged = samples;
    merged.extend(inserted);
    merged.sort_by_key(|s| s.timestamp);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Device;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(offset_sec: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(offset_sec)
    }

    fn sample(offset_sec: i64, code: &str, per_sec: Option<f64>) -> Sample {
        Sample {
            timestamp: ts(offset_sec),
            session_id: 1,
            code: code.to_string(),
            kind: SampleKind::Real,
            rates: per_sec.map(Rates::from_per_sec),
            device_counter: None,
            ongoing: false,
            device: Device::new("hset", "a1"),
            log_version: "2".to_string(),
        }
    }

    #[test]
    fn inserts_single_boundary_at_threshold() {
        // 45s between measurements, threshold 20s: one zero-rate row at +20s.
        let filled = fill_gaps(
            vec![
                sample(0, "1.7.0.1", Some(1.5)),
                sample(45, "1.7.0.1", Some(1.6)),
            ],
            &AnalysisConfig::default(),
        );

        assert_eq!(filled.len(), 3);
        let boundary = &filled[1];
        assert_eq!(boundary.kind, SampleKind::GapFill);
        assert_eq!(boundary.timestamp, ts(20));
        assert!((boundary.rates.unwrap().per_sec).abs() < f64::EPSILON);
        assert_eq!(boundary.session_id, 1);
    }

    #[test]
    fn no_boundary_below_threshold() {
        let filled = fill_gaps(
            vec![
                sample(0, "1.7.0.1", Some(1.5)),
                sample(20, "1.7.0.1", Some(1.6)),
            ],
            &AnalysisConfig::default(),
        );
        assert_eq!(filled.len(), 2);
    }

    #[test]
    fn gap_before_start_code_left_alone() {
        let filled = fill_gaps(
            vec![
                sample(0, "1.7.1.0", None),
                sample(600, "1.7.0.0", None),
            ],
            &AnalysisConfig::default(),
        );
        assert_eq!(filled.len(), 2);
    }

    #[test]
    fn boundary_never_shares_a_timestamp() {
        let filled = fill_gaps(
            vec![
                sample(0, "1.7.0.1", Some(1.0)),
                sample(21, "1.7.0.1", Some(1.0)),
            ],
            &AnalysisConfig::default(),
        );
        assert_eq!(filled.len(), 3);
        assert!(filled.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn one_boundary_per_gap() {
        let filled = fill_gaps(
            vec![
                sample(0, "1.7.0.1", Some(1.0)),
                sample(100, "1.7.0.1", Some(1.0)),
                sample(200, "1.7.0.1", Some(1.0)),
            ],
            &AnalysisConfig::default(),
        );
        let boundaries: Vec<_> = filled
            .iter()
            .filter(|s| s.kind == SampleKind::GapFill)
            .collect();
        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries[0].timestamp, ts(20));
        assert_eq!(boundaries[1].timestamp, ts(120));
    }

    #[test]
    fn boundary_carries_ongoing_flag() {
        let mut late = sample(45, "1.7.0.1", Some(1.0));
        late.ongoing = true;
        let filled = fill_gaps(
            vec![sample(0, "1.7.0.1", Some(1.0)), late],
            &AnalysisConfig::default(),
        );
        assert!(filled[1].ongoing);
    }
}
