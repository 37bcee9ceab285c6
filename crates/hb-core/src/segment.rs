//! Session segmentation.
//!
//! A finite-state fold over the ordered event log that assigns every
//! retained event to a recording session and discards the rest:
//! orphaned measurements before any start code, stray end codes, rows
//! with unrecognized codes, and duplicate-timestamp measurements.
//!
//! The fold always starts idle. Continuity across runs comes from the
//! id seed: a run that replays an open session's events seeds the
//! counter so the replayed start code re-mints the same session id.

use crate::config::{AnalysisConfig, CodeKind};
use crate::event::LogEvent;

/// Segmenter state after the final event of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The last session closed cleanly.
    Idle,
    /// The session with this id is still open.
    InSession(i64),
}

/// A retained event labeled with its session.
#[derive(Debug, Clone)]
pub struct SegmentedEvent {
    pub event: LogEvent,
    pub session_id: i64,
}

/// Result of one segmentation pass.
#[derive(Debug)]
pub struct Segmentation {
    /// Retained rows in input order.
    pub rows: Vec<SegmentedEvent>,
    /// State after the final event; `InSession` means the recording is
    /// still open.
    pub end_state: SessionState,
    /// Highest session id assigned, or the seed if no session opened.
    pub last_session_id: i64,
    /// Position of the open session's start event - the point the next
    /// run must replay from. `None` when the last session closed.
    pub open_anchor: Option<i64>,
    /// Number of discarded events.
    pub discarded: usize,
}

/// Runs the segmentation fold.
///
/// `session_id_seed` is the highest id already settled for this device;
/// the first start code in the batch opens `seed + 1`.
pub fn segment_events(
    events: Vec<LogEvent>,
    session_id_seed: i64,
    config: &AnalysisConfig,
) -> Segmentation {
    let mut state = SessionState::Idle;
    let mut last_session_id = session_id_seed;
    let mut open_anchor = None;

    let mut rows = Vec::with_capacity(events.len());
    let mut discarded = 0usize;
    // Raw predecessor, regardless of whether it was retained. The
    // duplicate-timestamp rule compares against raw log order.
    let mut prev: Option<(chrono::DateTime<chrono::Utc>, CodeKind)> = None;

    for event in events {
        let kind = config.classify(&event.code);
        let zero_delta = prev.is_some_and(|(ts, _)| ts == event.timestamp);
        let prev_is_start = matches!(prev, Some((_, CodeKind::Start)));
        prev = Some((event.timestamp, kind));

        match (state, kind) {
            (_, CodeKind::Start) => {
                // A start code while already in a session implicitly
                // closes it and opens the next one.
                last_session_id += 1;
                state = SessionState::InSession(last_session_id);
                open_anchor = Some(event.position);
                rows.push(SegmentedEvent {
                    event,
                    session_id: last_session_id,
                });
            }
            (SessionState::InSession(id), CodeKind::End) => {
                rows.push(SegmentedEvent {
                    event,
                    session_id: id,
                });
                state = SessionState::Idle;
                open_anchor = None;
            }
            (SessionState::InSession(id), CodeKind::Measurement(_)) => {
                if zero_delta && !prev_is_start {
                    // Same timestamp as the previous row: a logging
                    // duplicate, not a new reading.
                    tracing::trace!(position = event.position, "dropping duplicate measurement");
                    discarded += 1;
                } else {
                    rows.push(SegmentedEvent {
                        event,
                        session_id: id,
                    });
                }
            }
            (SessionState::InSession(id), CodeKind::Counter) => {
                rows.push(SegmentedEvent {
                    event,
                    session_id: id,
                });
            }
            // Anything outside a session that is not a start code is an
            // orphan; unknown codes are dropped in any state.
            (SessionState::Idle, _) | (_, CodeKind::Unknown) => {
                tracing::trace!(
                    position = event.position,
                    code = %event.code,
                    "dropping event outside session"
                );
                discarded += 1;
            }
        }
    }

    Segmentation {
        rows,
        end_state: state,
        last_session_id,
        open_anchor,
        discarded,
    }
}
