//! Continuation cursor.
//!
//! Each device run persists where it stopped so the next run only reads
//! new events. When a session was still open at the end of a run the
//! cursor points just before that session's start event rather than at
//! the last row read: the next run replays the whole open session,
//! recomputes it with the data that arrived since, and supersedes the
//! previously stored ongoing rows.

use serde::{Deserialize, Serialize};

/// Durable per-device analysis position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationCursor {
    /// Exclusive lower bound for the next run's event query. With an
    /// open session this sits just before its start event, so the
    /// session replays in full.
    pub last_position: i64,
    /// Highest session id assigned so far for this device. With an open
    /// session this is that session's id.
    pub last_session_id: i64,
    /// Whether the last run ended inside a session.
    pub session_open: bool,
}

impl ContinuationCursor {
    /// The cursor of a device that has never been analyzed.
    pub fn start() -> Self {
        Self {
            last_position: 0,
            last_session_id: 0,
            session_open: false,
        }
    }

    /// The segmenter id seed for the next run. An open session's start
    /// event replays, so the seed backs off by one and the replayed
    /// start re-mints the same id.
    pub fn session_id_seed(&self) -> i64 {
        if self.session_open {
            self.last_session_id - 1
        } else {
            self.last_session_id
        }
    }
}

impl Default for ContinuationCursor {
    fn default() -> Self {
        Self::start()
    }
}
