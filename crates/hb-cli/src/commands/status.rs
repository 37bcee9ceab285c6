//! Status command: per-device cursor positions and pending work.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use hb_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    writeln!(writer, "Heartbeat analysis status")?;
    writeln!(writer, "Database: {}", database_path.display())?;

    let devices = db.list_devices()?;
    if devices.is_empty() {
        writeln!(writer, "No devices ingested.")?;
        return Ok(());
    }

    writeln!(writer, "Devices:")?;
    for device in devices {
        let cursor = db.load_cursor(&device)?;
        let pending = db.count_events_after(&device, cursor.last_position)?;
        let session = if cursor.session_open {
            format!("session {} open", cursor.last_session_id)
        } else {
            format!("{} sessions", cursor.last_session_id)
        };
        writeln!(
            writer,
            "- {device}: cursor {}, {session}, {pending} events pending",
            cursor.last_position,
        )?;
    }
    Ok(())
}
