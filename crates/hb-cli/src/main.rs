use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hb_cli::commands::{analyze, ingest, parse_device, report, status};
use hb_cli::{Cli, Commands, Config};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(hb_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = hb_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // try_init so tests that run commands in-process don't panic.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let mut stdout = std::io::stdout();
    match &cli.command {
        Some(Commands::Ingest { dir }) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            let summary = ingest::run(&mut db, dir, &config.device_types)?;
            println!(
                "Ingested {} rows from {} files ({} duplicates, {} malformed, {} files skipped)",
                summary.rows_inserted,
                summary.files,
                summary.rows_duplicate,
                summary.rows_malformed,
                summary.files_skipped,
            );
        }
        Some(Commands::Analyze { device }) => {
            let device = device.as_deref().map(parse_device).transpose()?;
            let (mut db, config) = open_database(cli.config.as_deref())?;
            analyze::run(&mut stdout, &mut db, device.as_ref(), &config.analysis)?;
        }
        Some(Commands::Report { device, json }) => {
            let device = device.as_deref().map(parse_device).transpose()?;
            let (db, _config) = open_database(cli.config.as_deref())?;
            report::run(&mut stdout, &db, device.as_ref(), *json)?;
        }
        Some(Commands::Status) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            status::run(&mut stdout, &db, &config.database_path)?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
