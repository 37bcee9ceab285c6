//! Ingest command: load device CSV logs into the events table.
//!
//! Log files are named `<DEVICE_TYPE>_<DEVICE_ID>_<DATE>.csv` and carry
//! rows of `time,log_version,log_code,log_data1,log_data2,log_data3`
//! with `time` as `%H:%M:%S`; the date comes from the filename. Files
//! for unconfigured device types and files with unparseable names are
//! skipped with a warning. Files parse in parallel; inserts are
//! idempotent, so re-ingesting a directory is safe.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use hb_core::Device;
use hb_db::{Database, NewEvent};
use rayon::prelude::*;

/// Outcome of one ingest pass.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub files: usize,
    pub files_skipped: usize,
    pub rows_inserted: usize,
    pub rows_duplicate: usize,
    pub rows_malformed: usize,
}

/// Scans `dir` for device log files and loads them.
pub fn run(db: &mut Database, dir: &Path, device_types: &[String]) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    let mut files: Vec<(PathBuf, Device, NaiveDate)> = Vec::new();

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read log directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        match parse_filename(name, device_types) {
            Some((device, date)) => files.push((path, device, date)),
            None => {
                tracing::warn!(file = %path.display(), "skipping unrecognized log file");
                summary.files_skipped += 1;
            }
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let parsed: Vec<Result<ParsedFile>> = files
        .par_iter()
        .map(|(path, device, date)| parse_file(path, device, *date))
        .collect();

    for file in parsed {
        let file = file?;
        let inserted = db.insert_events(&file.events)?;
        summary.files += 1;
        summary.rows_inserted += inserted;
        summary.rows_duplicate += file.events.len() - inserted;
        summary.rows_malformed += file.malformed;
    }
    tracing::info!(
        files = summary.files,
        skipped = summary.files_skipped,
        inserted = summary.rows_inserted,
        "ingest finished"
    );
    Ok(summary)
}

/// Splits `<TYPE>_<ID>_<DATE>` into its parts. The id may itself
/// contain underscores; type is the first segment, date the last.
fn parse_filename(stem: &str, device_types: &[String]) -> Option<(Device, NaiveDate)> {
    let (device_type, rest) = stem.split_once('_')?;
    let (device_id, date) = rest.rsplit_once('_')?;
    if device_id.is_empty() || !device_types.iter().any(|t| t == device_type) {
        return None;
    }
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some((Device::new(device_type, device_id), date))
}

struct ParsedFile {
    events: Vec<NewEvent>,
    malformed: usize,
}

fn parse_file(path: &Path, device: &Device, date: NaiveDate) -> Result<ParsedFile> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut events = Vec::new();
    let mut malformed = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || (index == 0 && trimmed.starts_with("time,")) {
            continue;
        }
        match parse_line(trimmed, device, date) {
            Some(event) => events.push(event),
            None => {
                tracing::warn!(
                    file = %path.display(),
                    line = index + 1,
                    "skipping malformed log row"
                );
                malformed += 1;
            }
        }
    }
    Ok(ParsedFile { events, malformed })
}

/// Parses one `time,log_version,log_code,log_data1,log_data2,log_data3`
/// row. The two trailing data columns may be empty.
fn parse_line(line: &str, device: &Device, date: NaiveDate) -> Option<NewEvent> {
    let mut fields = line.split(',');
    let time = NaiveTime::parse_from_str(fields.next()?.trim(), "%H:%M:%S").ok()?;
    let log_version = fields.next()?.trim();
    let code = fields.next()?.trim();
    if log_version.is_empty() || code.is_empty() {
        return None;
    }
    let value1 = fields.next()?.trim().parse::<f64>().ok()?;
    let unit = fields
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    let aux = fields
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok());

    Some(NewEvent {
        timestamp: date.and_time(time).and_utc(),
        code: code.to_string(),
        value1,
        unit,
        aux,
        device: device.clone(),
        log_version: log_version.to_string(),
    })
}
