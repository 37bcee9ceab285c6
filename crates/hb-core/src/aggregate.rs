//! Per-hour beat totals.
//!
//! Groups the gap-filled sample series by session and then by calendar
//! hour, reconciling the device's own cumulative counter against the
//! totals derived from rates. The counter baseline is an explicit
//! accumulator threaded across the buckets of a session, reset when the
//! next session begins.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::event::Device;
use crate::sample::Sample;

/// Aggregated beats for one `(session, date, hour)` bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourBucket {
    pub date: NaiveDate,
    pub session_id: i64,
    pub hour: u32,
    pub total_beats: i64,
    /// Span between the bucket's first and last sample, in seconds.
    pub total_time_sec: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub device: Device,
    pub log_version: String,
    /// Whether the bucket's samples cover minute 0 through minute 59.
    pub is_hour_complete: bool,
    pub ongoing: bool,
}

/// A sample with its derived beat contribution.
struct Counted<'a> {
    sample: &'a Sample,
    /// `floor(span_from_prev * per_sec)`, when both are known.
    beats: Option<i64>,
}

/// Aggregates the gap-filled series into hour buckets.
///
/// The input must be ordered by timestamp with each session's rows
/// contiguous, which is what the upstream stages produce.
pub fn aggregate(samples: &[Sample]) -> Result<Vec<HourBucket>, AnalysisError> {
    // Each row's beats cover the span since the previous row: a reading
    // accounts for the stretch it closes, and a gap's zero boundary
    // zeroes out the silent window before it. The series' first row has
    // no span and contributes nothing; neither do rows without rates.
    let counted: Vec<Counted<'_>> = samples
        .iter()
        .enumerate()
        .map(|(i, sample)| {
            let beats = match (sample.rates, i.checked_sub(1).and_then(|j| samples.get(j))) {
                (Some(rates), Some(prev)) => {
                    let span =
                        (sample.timestamp - prev.timestamp).num_milliseconds() as f64 / 1000.0;
                    Some((span * rates.per_sec).floor() as i64)
                }
                _ => None,
            };
            Counted { sample, beats }
        })
        .collect();

    let mut buckets = Vec::new();
    for session in chunk_by(&counted, |a, b| a.sample.session_id == b.sample.session_id) {
        // Cumulative counter baseline, carried across this session's buckets.
        let mut baseline = 0.0f64;
        for bucket in chunk_by(session, |a, b| {
            hour_key(a.sample.timestamp) == hour_key(b.sample.timestamp)
        }) {
            buckets.push(fold_bucket(bucket, &mut baseline)?);
        }
    }
    Ok(buckets)
}

fn hour_key(ts: DateTime<Utc>) -> (NaiveDate, u32) {
    (ts.date_naive(), ts.hour())
}

/// Splits a slice into maximal runs of adjacent elements for which
/// `same` holds.
fn chunk_by<'a, T>(
    items: &'a [T],
    same: impl Fn(&T, &T) -> bool + 'a,
) -> impl Iterator<Item = &'a [T]> {
    let mut start = 0;
    let mut index = 1;
    std::iter::from_fn(move || {
        if start >= items.len() {
            return None;
        }
        while index < items.len() && same(&items[index - 1], &items[index]) {
            index += 1;
        }
        let chunk = &items[start..index];
        start = index;
        index += 1;
        Some(chunk)
    })
}

fn fold_bucket(rows: &[Counted<'_>], baseline: &mut f64) -> Result<HourBucket, AnalysisError> {
    let first = &rows[0].sample;
    let last = &rows[rows.len() - 1].sample;
    let (date, hour) = hour_key(first.timestamp);
    let session_id = first.session_id;

    check_single_valued(rows, session_id, hour)?;

    let derived_sum = |rows: &[Counted<'_>]| -> i64 { rows.iter().filter_map(|r| r.beats).sum() };

    // Three-way reconciliation against the device's cumulative counter.
    let last_counter = rows
        .iter()
        .rposition(|r| r.sample.device_counter.is_some());
    let total = match last_counter {
        // No counter reading this hour: trust the derived totals.
        None => derived_sum(rows) as f64,
        Some(l) => {
            let counter = rows[l].sample.device_counter.unwrap_or_default();
            let from_counter = counter - *baseline;
            *baseline = counter;
            if l + 2 == rows.len() {
                // Counter right before the closing row covers the hour.
                from_counter
            } else {
                // Stale counter: add the derived beats measured after it.
                from_counter + derived_sum(&rows[l + 1..]) as f64
            }
        }
    };

    let total_beats = if total < 0.0 {
        // A counter reading below the running baseline means the device
        // counter reset mid-session.
        tracing::warn!(
            session_id,
            hour,
            total,
            "negative reconciled total clamped to zero"
        );
        0
    } else {
        total.floor() as i64
    };

    Ok(HourBucket {
        date,
        session_id,
        hour,
        total_beats,
        total_time_sec: (last.timestamp - first.timestamp).num_seconds(),
        start_time: first.timestamp,
        end_time: last.timestamp,
        device: first.device.clone(),
        log_version: first.log_version.clone(),
        is_hour_complete: first.timestamp.minute() == 0 && last.timestamp.minute() == 59,
        ongoing: rows.iter().any(|r| r.sample.ongoing),
    })
}

fn check_single_valued(
    rows: &[Counted<'_>],
    session_id: i64,
    hour: u32,
) -> Result<(), AnalysisError> {
    let first = &rows[0].sample;
    for row in &rows[1..] {
        let mismatch = if row.sample.device.device_type != first.device.device_type {
            Some(("device_type", &first.device.device_type, &row.sample.device.device_type))
        } else if row.sample.device.device_id != first.device.device_id {
            Some(("device_id", &first.device.device_id, &row.sample.device.device_id))
        } else if row.sample.log_version != first.log_version {
            Some(("log_version", &first.log_version, &row.sample.log_version))
        } else {
            None
        };
        if let Some((field, left, right)) = mismatch {
            return Err(AnalysisError::MixedDeviceIdentity {
                field,
                session_id,
                hour,
                left: left.clone(),
                right: right.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Rates, SampleKind};
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    fn sample(ts: DateTime<Utc>, session_id: i64, code: &str, per_sec: Option<f64>) -> Sample {
        Sample {
            timestamp: ts,
            session_id,
            code: code.to_string(),
            kind: SampleKind::Real,
            rates: per_sec.map(Rates::from_per_sec),
            device_counter: None,
            ongoing: false,
            device: Device::new("hset", "a1"),
            log_version: "2".to_string(),
        }
    }

    fn counter(ts: DateTime<Utc>, session_id: i64, value: f64) -> Sample {
        Sample {
            device_counter: Some(value),
            ..sample(ts, session_id, "1.7.0.2", None)
        }
    }


    #[test]
    fn derived_total_without_counter_rows() {
        // Scenario A: start, 10 b/s after 5s, 12 b/s after 5s more, end.
        let series = vec![
            sample(at(0, 0, 0), 1, "1.7.0.0", None),
            sample(at(0, 0, 5), 1, "1.7.0.1", Some(10.0)),
            sample(at(0, 0, 10), 1, "1.7.0.1", Some(12.0)),
            sample(at(0, 0, 15), 1, "1.7.1.0", None),
        ];
        let buckets = aggregate(&series).unwrap();

        assert_eq!(buckets.len(), 1);
        let bucket = &buckets[0];
        assert_eq!(bucket.total_beats, 110); // floor(5*10) + floor(5*12)
        assert_eq!(bucket.total_time_sec, 15);
        assert_eq!(bucket.start_time, at(0, 0, 0));
        assert_eq!(bucket.end_time, at(0, 0, 15));
        assert!(!bucket.is_hour_complete);
        assert!(!bucket.ongoing);
    }

    #[test]
    fn beats_cover_the_span_since_the_previous_row() {
        // One reading 10s after the start and 30s before the end: only
        // the lead-in span it closes counts at the measured rate.
        let series = vec![
            sample(at(0, 0, 0), 1, "1.7.0.0", None),
            sample(at(0, 0, 10), 1, "1.7.0.1", Some(2.0)),
            sample(at(0, 0, 40), 1, "1.7.1.0", None),
        ];
        let buckets = aggregate(&series).unwrap();
        assert_eq!(buckets[0].total_beats, 20); // floor(10*2)
    }

    #[test]
    fn counter_before_closing_row_wins_outright() {
        // counter at the second-to-last position: the hour total is the
        // counter delta alone.
        let series = vec![
            sample(at(0, 0, 0), 1, "1.7.0.0", None),
            sample(at(0, 0, 10), 1, "1.7.0.1", Some(2.0)),
            counter(at(0, 0, 50), 1, 95.0),
            sample(at(0, 0, 55), 1, "1.7.1.0", None),
        ];
        let buckets = aggregate(&series).unwrap();
        assert_eq!(buckets[0].total_beats, 95);
    }

    #[test]
    fn stale_counter_adds_derived_tail() {
        let series = vec![
            sample(at(0, 0, 0), 1, "1.7.0.0", None),
            counter(at(0, 0, 20), 1, 40.0),
            sample(at(0, 0, 30), 1, "1.7.0.1", Some(2.0)),
            sample(at(0, 0, 40), 1, "1.7.0.1", Some(2.0)),
            sample(at(0, 0, 50), 1, "1.7.1.0", None),
        ];
        let buckets = aggregate(&series).unwrap();
        // counter delta 40 + floor(10*2) + floor(10*2)
        assert_eq!(buckets[0].total_beats, 80);
    }

    #[test]
    fn baseline_carries_across_buckets_within_session() {
        let series = vec![
            sample(at(9, 50, 0), 1, "1.7.0.0", None),
            counter(at(9, 59, 0), 1, 100.0),
            sample(at(9, 59, 30), 1, "1.7.1.0", None),
            sample(at(10, 0, 0), 2, "1.7.0.0", None),
            counter(at(10, 30, 0), 2, 250.0),
            sample(at(10, 30, 30), 2, "1.7.1.0", None),
        ];
        // Two sessions: baseline must reset between them.
        let buckets = aggregate(&series).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].total_beats, 100);
        assert_eq!(buckets[1].total_beats, 250); // fresh baseline, not 150

        // Same shape inside one session: the second bucket is a delta.
        let series: Vec<Sample> = vec![
            sample(at(9, 50, 0), 1, "1.7.0.0", None),
            counter(at(9, 59, 0), 1, 100.0),
            sample(at(9, 59, 30), 1, "1.7.0.1", Some(1.0)),
            counter(at(10, 30, 0), 1, 250.0),
            sample(at(10, 30, 30), 1, "1.7.1.0", None),
        ];
        let buckets = aggregate(&series).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[1].total_beats, 150);
    }

    #[test]
    fn hour_complete_requires_minutes_zero_and_fiftynine() {
        let series = vec![
            sample(at(14, 0, 3), 1, "1.7.0.0", None),
            sample(at(14, 30, 0), 1, "1.7.0.1", Some(1.0)),
            sample(at(14, 59, 45), 1, "1.7.1.0", None),
        ];
        let buckets = aggregate(&series).unwrap();
        assert!(buckets[0].is_hour_complete);

        let series = vec![
            sample(at(14, 1, 0), 1, "1.7.0.0", None),
            sample(at(14, 59, 45), 1, "1.7.1.0", None),
        ];
        let buckets = aggregate(&series).unwrap();
        assert!(!buckets[0].is_hour_complete);
    }

    #[test]
    fn ongoing_bubbles_up_from_any_row() {
        let mut tail = sample(at(8, 0, 30), 1, "1.7.0.1", Some(1.0));
        tail.ongoing = true;
        let series = vec![sample(at(8, 0, 0), 1, "1.7.0.0", None), tail];
        let buckets = aggregate(&series).unwrap();
        assert!(buckets[0].ongoing);
    }

    #[test]
    fn aggregation_is_idempotent_for_closed_sessions() {
        let series = vec![
            sample(at(0, 0, 0), 1, "1.7.0.0", None),
            sample(at(0, 0, 5), 1, "1.7.0.1", Some(10.0)),
            sample(at(0, 0, 10), 1, "1.7.0.1", Some(12.0)),
            sample(at(0, 0, 15), 1, "1.7.1.0", None),
        ];
        let first = aggregate(&series).unwrap();
        let second = aggregate(&series).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn mixed_identity_fails() {
        let mut foreign = sample(at(0, 0, 5), 1, "1.7.0.1", Some(1.0));
        foreign.device = Device::new("hphire", "z9");
        let series = vec![sample(at(0, 0, 0), 1, "1.7.0.0", None), foreign];
        let err = aggregate(&series).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::MixedDeviceIdentity { field: "device_type", .. }
        ));
    }

    #[test]
    fn counter_reset_clamps_to_zero() {
        let series = vec![
            sample(at(0, 0, 0), 1, "1.7.0.0", None),
            counter(at(0, 20, 0), 1, 500.0),
            sample(at(0, 20, 30), 1, "1.7.0.1", Some(1.0)),
            counter(at(1, 10, 0), 1, 3.0), // device counter reset
            sample(at(1, 10, 30), 1, "1.7.1.0", None),
        ];
        let buckets = aggregate(&series).unwrap();
        assert_eq!(buckets[1].total_beats, 0);
    }

    #[test]
    fn buckets_split_on_hour_boundary() {
        let series = vec![
            sample(at(22, 50, 0), 1, "1.7.0.0", None),
            sample(at(22, 55, 0), 1, "1.7.0.1", Some(1.0)),
            sample(at(23, 5, 0), 1, "1.7.0.1", Some(1.0)),
            sample(at(23, 10, 0), 1, "1.7.1.0", None),
        ];
        let buckets = aggregate(&series).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].hour, 22);
        assert_eq!(buckets[1].hour, 23);
        // The reading logged after the boundary closes its whole span in 23h.
        assert_eq!(buckets[0].total_beats, 300);
        assert_eq!(buckets[1].total_beats, 600);
    }
}
