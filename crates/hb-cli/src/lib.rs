//! Heartbeat analysis CLI library.
//!
//! This crate provides the command-line interface around the engine
//! (`hb-core`) and the storage layer (`hb-db`).

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::Config;
