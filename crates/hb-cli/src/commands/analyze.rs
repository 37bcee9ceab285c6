//! Analyze command: run the engine over each device's unread events.

use std::io::Write;

use anyhow::{Context, Result};
use hb_core::{AnalysisConfig, Device, analyze_device};
use hb_db::Database;

/// Analyzes pending events for one device, or for every known device.
///
/// Each device is processed and committed independently, so one
/// device's bad data does not hold back the others; the first failure
/// is still reported after the loop.
pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    device: Option<&Device>,
    config: &AnalysisConfig,
) -> Result<()> {
    let devices = match device {
        Some(device) => vec![device.clone()],
        None => db.list_devices()?,
    };
    if devices.is_empty() {
        writeln!(writer, "No devices ingested yet.")?;
        return Ok(());
    }

    let mut first_failure = None;
    for device in devices {
        if let Err(err) = run_device(writer, db, &device, config) {
            tracing::error!(device = %device, error = %err, "analysis failed, nothing committed");
            writeln!(writer, "{device}: FAILED ({err:#})")?;
            first_failure.get_or_insert(err);
        }
    }
    match first_failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn run_device<W: Write>(
    writer: &mut W,
    db: &mut Database,
    device: &Device,
    config: &AnalysisConfig,
) -> Result<()> {
    let cursor = db.load_cursor(device)?;
    let events = db.events_after(device, cursor.last_position)?;
    let read = events.len();

    let output = analyze_device(events, cursor, config)
        .with_context(|| format!("analysis failed for {device}"))?;
    db.commit_run(device, &output)
        .with_context(|| format!("commit failed for {device}"))?;

    tracing::info!(
        device = %device,
        read,
        samples = output.samples.len(),
        buckets = output.buckets.len(),
        discarded = output.discarded,
        cursor = output.cursor.last_position,
        "analysis run committed"
    );
    let open = if output.cursor.session_open {
        ", session open"
    } else {
        ""
    };
    writeln!(
        writer,
        "{device}: {read} events -> {} samples, {} hour buckets ({} discarded{open})",
        output.samples.len(),
        output.buckets.len(),
        output.discarded,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hb_db::NewEvent;

    fn new_event(offset_sec: i64, code: &str, value1: f64, device: &Device) -> NewEvent {
        NewEvent {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
                + chrono::Duration::seconds(offset_sec),
            code: code.to_string(),
            value1,
            unit: Some("s".to_string()),
            aux: None,
            device: device.clone(),
            log_version: "2".to_string(),
        }
    }

    #[test]
    fn analyzes_every_device_and_advances_cursors() {
        let mut db = Database::open_in_memory().unwrap();
        let a = Device::new("hset", "a1");
        let b = Device::new("hphire", "z9");
        db.insert_events(&[
            new_event(0, "1.7.0.0", 0.0, &a),
            new_event(5, "1.7.0.1", 1.0, &a),
            new_event(10, "1.7.1.0", 0.0, &a),
            new_event(0, "170", 0.0, &b),
            new_event(5, "200", 1.0, &b),
        ])
        .unwrap();

        let mut out = Vec::new();
        run(&mut out, &mut db, None, &AnalysisConfig::default()).unwrap();

        assert!(!db.load_cursor(&a).unwrap().session_open);
        assert!(db.load_cursor(&b).unwrap().session_open);

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("hset:a1"));
        assert!(out.contains("hphire:z9"));
        assert!(out.contains("session open"));
    }

    #[test]
    fn bad_device_does_not_block_the_rest() {
        let mut db = Database::open_in_memory().unwrap();
        let bad = Device::new("hset", "a1");
        let good = Device::new("hset", "b2");
        let mut unknown_unit = new_event(5, "1.7.0.1", 1.0, &bad);
        unknown_unit.unit = Some("furlong".to_string());
        db.insert_events(&[
            new_event(0, "1.7.0.0", 0.0, &bad),
            unknown_unit,
            new_event(0, "1.7.0.0", 0.0, &good),
            new_event(5, "1.7.0.1", 1.0, &good),
            new_event(10, "1.7.1.0", 0.0, &good),
        ])
        .unwrap();

        let mut out = Vec::new();
        let result = run(&mut out, &mut db, None, &AnalysisConfig::default());

        assert!(result.is_err());
        // The failed device's cursor stays put; the good one advanced.
        assert_eq!(db.load_cursor(&bad).unwrap().last_position, 0);
        assert!(db.load_cursor(&good).unwrap().last_position > 0);
    }
}
