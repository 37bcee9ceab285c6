//! Report command: print hourly beat totals.

use std::io::Write;

use anyhow::Result;
use chrono::NaiveDate;
use hb_core::{Device, HourBucket};
use hb_db::Database;
use serde::Serialize;

/// One hour bucket in JSON output.
#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    device: String,
    log_version: &'a str,
    date: NaiveDate,
    hour: u32,
    session_id: i64,
    total_beats: i64,
    total_time_sec: i64,
    is_hour_complete: bool,
    ongoing: bool,
}

impl<'a> From<&'a HourBucket> for ReportRow<'a> {
    fn from(bucket: &'a HourBucket) -> Self {
        Self {
            device: bucket.device.to_string(),
            log_version: &bucket.log_version,
            date: bucket.date,
            hour: bucket.hour,
            session_id: bucket.session_id,
            total_beats: bucket.total_beats,
            total_time_sec: bucket.total_time_sec,
            is_hour_complete: bucket.is_hour_complete,
            ongoing: bucket.ongoing,
        }
    }
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    device: Option<&Device>,
    json: bool,
) -> Result<()> {
    let buckets = db.list_hour_totals(device)?;

    if json {
        let rows: Vec<ReportRow<'_>> = buckets.iter().map(ReportRow::from).collect();
        serde_json::to_writer_pretty(&mut *writer, &rows)?;
        writeln!(writer)?;
        return Ok(());
    }

    if buckets.is_empty() {
        writeln!(writer, "No hour totals recorded.")?;
        return Ok(());
    }

    let mut current_device = None;
    for bucket in &buckets {
        if current_device != Some(&bucket.device) {
            writeln!(writer, "{}", bucket.device)?;
            current_device = Some(&bucket.device);
        }
        let mut flags = String::new();
        if !bucket.is_hour_complete {
            flags.push_str(" partial");
        }
        if bucket.ongoing {
            flags.push_str(" ongoing");
        }
        writeln!(
            writer,
            "  {} {:02}:00  session {:>3}  {:>8} beats  {:>5}s{flags}",
            bucket.date, bucket.hour, bucket.session_id, bucket.total_beats,
            bucket.total_time_sec,
        )?;
    }
    Ok(())
}
