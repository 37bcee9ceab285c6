//! Storage layer for the heartbeat analysis engine.
//!
//! Persists raw log events, the derived rate series, hourly totals and
//! the per-device continuation cursor using `rusqlite`.
//!
//! # Thread Safety
//!
//! [`Database`] wraps a `rusqlite::Connection`, which is `Send` but not
//! `Sync`: an instance can move between threads but cannot be shared
//! without external synchronization.
//!
//! # Schema
//!
//! Timestamps are stored as TEXT in ISO 8601 (e.g.
//! `2024-03-01T09:00:00.000Z`), so lexicographic ordering matches
//! chronological ordering and values stay human-readable. Everything is
//! UTC.
//!
//! The `events` table is append-only input; `rate_series` and
//! `hour_totals` are derived output and only ever rewritten through
//! [`Database::commit_run`], which replaces a device's `ongoing` rows
//! and advances its cursor in one transaction. The cursor therefore
//! never diverges from the committed data.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use hb_core::pipeline::RunOutput;
use hb_core::{ContinuationCursor, Device, HourBucket, LogEvent, Sample};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp failed to parse back.
    #[error("invalid timestamp in {table} row {rowid}: {timestamp}")]
    TimestampParse {
        table: &'static str,
        rowid: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A raw log event ready to be stored.
///
/// `position` is assigned by the database on insert; everything else
/// comes from the parsed CSV row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub timestamp: DateTime<Utc>,
    pub code: String,
    pub value1: f64,
    pub unit: Option<String>,
    pub aux: Option<f64>,
    pub device: Device,
    pub log_version: String,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The schema is initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the
    /// connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the schema. Idempotent.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS events (
                position INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                code TEXT NOT NULL,
                value1 REAL NOT NULL,
                unit TEXT,
                aux REAL,
                device_type TEXT NOT NULL,
                device_id TEXT NOT NULL,
                log_version TEXT NOT NULL
            );

            -- Re-ingesting the same CSV must not duplicate rows.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_events_identity
                ON events(device_type, device_id, timestamp, code, value1);
            CREATE INDEX IF NOT EXISTS idx_events_device
                ON events(device_type, device_id, position);

            CREATE TABLE IF NOT EXISTS rate_series (
                timestamp TEXT NOT NULL,
                session_id INTEGER NOT NULL,
                code TEXT NOT NULL,
                kind TEXT NOT NULL,
                rate_sec REAL,
                rate_min REAL,
                rate_hr REAL,
                device_counter REAL,
                ongoing INTEGER NOT NULL DEFAULT 0,
                device_type TEXT NOT NULL,
                device_id TEXT NOT NULL,
                log_version TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_rate_series_device
                ON rate_series(device_type, device_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_rate_series_ongoing
                ON rate_series(device_type, device_id, ongoing);

            CREATE TABLE IF NOT EXISTS hour_totals (
                date TEXT NOT NULL,
                session_id INTEGER NOT NULL,
                hour INTEGER NOT NULL,
                total_beats INTEGER NOT NULL,
                total_time_sec INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                is_hour_complete INTEGER NOT NULL,
                ongoing INTEGER NOT NULL DEFAULT 0,
                device_type TEXT NOT NULL,
                device_id TEXT NOT NULL,
                log_version TEXT NOT NULL,
                PRIMARY KEY (device_type, device_id, session_id, date, hour)
            );

            CREATE TABLE IF NOT EXISTS cursors (
                device_type TEXT NOT NULL,
                device_id TEXT NOT NULL,
                last_position INTEGER NOT NULL,
                last_session_id INTEGER NOT NULL,
                session_open INTEGER NOT NULL,
                PRIMARY KEY (device_type, device_id)
            );
            ",
        )?;
        Ok(())
    }

    /// Inserts a batch of events, ignoring rows already present.
    ///
    /// Returns the number actually inserted.
    pub fn insert_events(&mut self, events: &[NewEvent]) -> Result<usize, DbError> {
        if events.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO events
                (timestamp, code, value1, unit, aux, device_type, device_id, log_version)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for event in events {
                inserted += stmt.execute(params![
                    format_timestamp(event.timestamp),
                    event.code,
                    event.value1,
                    event.unit,
                    event.aux,
                    event.device.device_type,
                    event.device.device_id,
                    event.log_version,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Lists every device that has at least one stored event.
    pub fn list_devices(&self) -> Result<Vec<Device>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT DISTINCT device_type, device_id
            FROM events
            ORDER BY device_type ASC, device_id ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Device {
                device_type: row.get(0)?,
                device_id: row.get(1)?,
            })
        })?;
        let mut devices = Vec::new();
        for row in rows {
            devices.push(row?);
        }
        Ok(devices)
    }

    /// Loads a device's events strictly after `position`, in the order
    /// the engine expects.
    pub fn events_after(&self, device: &Device, position: i64) -> Result<Vec<LogEvent>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT position, timestamp, code, value1, unit, aux, log_version
            FROM events
            WHERE device_type = ? AND device_id = ? AND position > ?
            ORDER BY timestamp ASC, position ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![device.device_type, device.device_id, position],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )?;
        let mut events = Vec::new();
        for row in rows {
            let (position, timestamp, code, value1, unit, aux, log_version) = row?;
            events.push(LogEvent {
                position,
                timestamp: parse_timestamp(&timestamp, "events", position)?,
                code,
                value1,
                unit,
                aux,
                device: device.clone(),
                log_version,
            });
        }
        Ok(events)
    }

    /// Counts a device's events strictly after `position`.
    pub fn count_events_after(&self, device: &Device, position: i64) -> Result<i64, DbError> {
        let count = self.conn.query_row(
            "
            SELECT COUNT(*)
            FROM events
            WHERE device_type = ? AND device_id = ? AND position > ?
            ",
            params![device.device_type, device.device_id, position],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Loads a device's continuation cursor, or the start cursor for a
    /// device that has never been analyzed.
    pub fn load_cursor(&self, device: &Device) -> Result<ContinuationCursor, DbError> {
        let cursor = self
            .conn
            .query_row(
                "
                SELECT last_position, last_session_id, session_open
                FROM cursors
                WHERE device_type = ? AND device_id = ?
                ",
                params![device.device_type, device.device_id],
                |row| {
                    Ok(ContinuationCursor {
                        last_position: row.get(0)?,
                        last_session_id: row.get(1)?,
                        session_open: row.get::<_, i64>(2)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(cursor.unwrap_or_default())
    }

    /// Commits one analysis run for a device atomically.
    ///
    /// Rows persisted as `ongoing` by the previous run are superseded
    /// by the replayed recomputation, so they are deleted before the
    /// new rows go in. The cursor advances in the same transaction; on
    /// any failure the whole run rolls back.
    pub fn commit_run(&mut self, device: &Device, output: &RunOutput) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        let superseded = tx.execute(
            "DELETE FROM rate_series WHERE device_type = ? AND device_id = ? AND ongoing = 1",
            params![device.device_type, device.device_id],
        )? + tx.execute(
            "DELETE FROM hour_totals WHERE device_type = ? AND device_id = ? AND ongoing = 1",
            params![device.device_type, device.device_id],
        )?;
        if superseded > 0 {
            tracing::debug!(device = %device, superseded, "replaced ongoing rows");
        }

        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO rate_series
                (timestamp, session_id, code, kind, rate_sec, rate_min, rate_hr,
                 device_counter, ongoing, device_type, device_id, log_version)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for sample in &output.samples {
                insert_sample(&mut stmt, sample)?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR REPLACE INTO hour_totals
                (date, session_id, hour, total_beats, total_time_sec, start_time,
                 end_time, is_hour_complete, ongoing, device_type, device_id, log_version)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for bucket in &output.buckets {
                insert_bucket(&mut stmt, bucket)?;
            }
        }
        tx.execute(
            "
            INSERT INTO cursors (device_type, device_id, last_position, last_session_id, session_open)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(device_type, device_id) DO UPDATE SET
                last_position = excluded.last_position,
                last_session_id = excluded.last_session_id,
                session_open = excluded.session_open
            ",
            params![
                device.device_type,
                device.device_id,
                output.cursor.last_position,
                output.cursor.last_session_id,
                i64::from(output.cursor.session_open),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Lists hour totals, optionally restricted to one device, ordered
    /// by device then time.
    pub fn list_hour_totals(&self, device: Option<&Device>) -> Result<Vec<HourBucket>, DbError> {
        let sql = "
            SELECT date, session_id, hour, total_beats, total_time_sec, start_time,
                   end_time, is_hour_complete, ongoing, device_type, device_id, log_version,
                   rowid
            FROM hour_totals
            ";
        let (filter, order) = (
            " WHERE device_type = ? AND device_id = ?",
            " ORDER BY device_type ASC, device_id ASC, start_time ASC",
        );
        let mut buckets = Vec::new();
        let mut push = |row: HourTotalRow| -> Result<(), DbError> {
            buckets.push(row.into_bucket()?);
            Ok(())
        };
        match device {
            Some(device) => {
                let mut stmt = self.conn.prepare(&format!("{sql}{filter}{order}"))?;
                let rows = stmt.query_map(
                    params![device.device_type, device.device_id],
                    HourTotalRow::from_row,
                )?;
                for row in rows {
                    push(row?)?;
                }
            }
            None => {
                let mut stmt = self.conn.prepare(&format!("{sql}{order}"))?;
                let rows = stmt.query_map([], HourTotalRow::from_row)?;
                for row in rows {
                    push(row?)?;
                }
            }
        }
        Ok(buckets)
    }
}

fn insert_sample(stmt: &mut rusqlite::Statement<'_>, sample: &Sample) -> Result<(), DbError> {
    stmt.execute(params![
        format_timestamp(sample.timestamp),
        sample.session_id,
        sample.code,
        sample.kind.as_str(),
        sample.rates.map(|r| r.per_sec),
        sample.rates.map(|r| r.per_min),
        sample.rates.map(|r| r.per_hr),
        sample.device_counter,
        i64::from(sample.ongoing),
        sample.device.device_type,
        sample.device.device_id,
        sample.log_version,
    ])?;
    Ok(())
}

fn insert_bucket(stmt: &mut rusqlite::Statement<'_>, bucket: &HourBucket) -> Result<(), DbError> {
    stmt.execute(params![
        bucket.date.to_string(),
        bucket.session_id,
        bucket.hour,
        bucket.total_beats,
        bucket.total_time_sec,
        format_timestamp(bucket.start_time),
        format_timestamp(bucket.end_time),
        i64::from(bucket.is_hour_complete),
        i64::from(bucket.ongoing),
        bucket.device.device_type,
        bucket.device.device_id,
        bucket.log_version,
    ])?;
    Ok(())
}

struct HourTotalRow {
    date: String,
    session_id: i64,
    hour: u32,
    total_beats: i64,
    total_time_sec: i64,
    start_time: String,
    end_time: String,
    is_hour_complete: bool,
    ongoing: bool,
    device: Device,
    log_version: String,
    rowid: i64,
}

impl HourTotalRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            date: row.get(0)?,
            session_id: row.get(1)?,
            hour: row.get(2)?,
            total_beats: row.get(3)?,
            total_time_sec: row.get(4)?,
            start_time: row.get(5)?,
            end_time: row.get(6)?,
            is_hour_complete: row.get::<_, i64>(7)? != 0,
            ongoing: row.get::<_, i64>(8)? != 0,
            device: Device {
                device_type: row.get(9)?,
                device_id: row.get(10)?,
            },
            log_version: row.get(11)?,
            rowid: row.get(12)?,
        })
    }

    fn into_bucket(self) -> Result<HourBucket, DbError> {
        let date = self
            .date
            .parse()
            .map_err(|source| DbError::TimestampParse {
                table: "hour_totals",
                rowid: self.rowid,
                timestamp: self.date.clone(),
                source,
            })?;
        Ok(HourBucket {
            date,
            session_id: self.session_id,
            hour: self.hour,
            total_beats: self.total_beats,
            total_time_sec: self.total_time_sec,
            start_time: parse_timestamp(&self.start_time, "hour_totals", self.rowid)?,
            end_time: parse_timestamp(&self.end_time, "hour_totals", self.rowid)?,
            device: self.device,
            log_version: self.log_version,
            is_hour_complete: self.is_hour_complete,
            ongoing: self.ongoing,
        })
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(
    timestamp: &str,
    table: &'static str,
    rowid: i64,
) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            table,
            rowid,
            timestamp: timestamp.to_string(),
            source,
        })
}
