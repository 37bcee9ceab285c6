//! The per-device analysis pipeline.
//!
//! Runs the full chain over one device's unread events: segmentation,
//! rate derivation, ongoing tagging, gap patching, hourly aggregation,
//! then resampling of the persisted timeline. The result is a pure
//! value; committing it (and the advanced cursor) atomically is the
//! storage layer's job.

use crate::aggregate::{HourBucket, aggregate};
use crate::config::AnalysisConfig;
use crate::cursor::ContinuationCursor;
use crate::error::AnalysisError;
use crate::event::LogEvent;
use crate::gaps::fill_gaps;
use crate::rate::derive_samples;
use crate::resample::{backfill_start_rates, resample};
use crate::sample::Sample;
use crate::segment::{SessionState, segment_events};

/// Everything one analysis run produced for a device.
#[derive(Debug)]
pub struct RunOutput {
    /// The rate timeline to persist, gap-patched and resampled.
    pub samples: Vec<Sample>,
    /// Hourly totals to persist.
    pub buckets: Vec<HourBucket>,
    /// Cursor to store alongside the rows, in the same transaction.
    pub cursor: ContinuationCursor,
    /// Events dropped by segmentation.
    pub discarded: usize,
}

/// Analyzes one device's events from where the cursor left off.
///
/// `events` must be the device's rows strictly after
/// `cursor.last_position`, in position order. On error nothing may be
/// committed; the cursor stays put and the next run retries the same
/// span.
pub fn analyze_device(
    events: Vec<LogEvent>,
    cursor: ContinuationCursor,
    config: &AnalysisConfig,
) -> Result<RunOutput, AnalysisError> {
    config.validate()?;

    let Some(last_position) = events.last().map(|e| e.position) else {
        return Ok(RunOutput {
            samples: Vec::new(),
            buckets: Vec::new(),
            cursor,
            discarded: 0,
        });
    };

    let seg = segment_events(events, cursor.session_id_seed(), config);
    tracing::debug!(
        retained = seg.rows.len(),
        discarded = seg.discarded,
        last_session_id = seg.last_session_id,
        "segmented event batch"
    );

    let open_session = match seg.end_state {
        SessionState::Idle => None,
        SessionState::InSession(id) => Some(id),
    };
    let next_cursor = match open_session {
        None => ContinuationCursor {
            last_position,
            last_session_id: seg.last_session_id,
            session_open: false,
        },
        Some(id) => ContinuationCursor {
            // Park just before the open session's start event so the
            // next run replays the session in full.
            last_position: seg.open_anchor.map_or(cursor.last_position, |p| p - 1),
            last_session_id: id,
            session_open: true,
        },
    };

    let mut samples = derive_samples(seg.rows, config)?;
    tag_ongoing(&mut samples, open_session);
    let mut samples = fill_gaps(samples, config);
    let buckets = aggregate(&samples)?;

    backfill_start_rates(&mut samples, config);
    let samples = resample(samples, config);

    Ok(RunOutput {
        samples,
        buckets,
        cursor: next_cursor,
        discarded: seg.discarded,
    })
}

/// Marks the still-open session's samples as ongoing.
///
/// Matching by session id matters: a session implicitly closed by a
/// newer start code has no end row, but it is settled and its rows must
/// not be superseded on the next run.
fn tag_ongoing(samples: &mut [Sample], open_session: Option<i64>) {
    let Some(id) = open_session else { return };
    for sample in samples.iter_mut().filter(|s| s.session_id == id) {
        sample.ongoing = true;
    }
}
