//! Core analysis engine for heartbeat device logs.
//!
//! This crate contains the pure domain logic:
//! - Segmentation: grouping ordered log events into recording sessions
//! - Rate derivation: normalizing measurements to beats/sec with
//!   per-class clamping
//! - Gap patching and fixed-cadence resampling of the rate timeline
//! - Hourly aggregation with device-counter reconciliation
//! - The continuation cursor that makes reruns incremental
//!
//! Nothing here touches storage; [`pipeline::analyze_device`] maps a
//! batch of events to a [`pipeline::RunOutput`] value and the database
//! crate commits it.

pub mod aggregate;
pub mod config;
pub mod cursor;
pub mod error;
pub mod event;
mod gaps;
pub mod pipeline;
mod rate;
mod resample;
pub mod sample;
pub mod segment;

pub use aggregate::HourBucket;
pub use config::{AnalysisConfig, CodeKind};
pub use cursor::ContinuationCursor;
pub use error::AnalysisError;
pub use event::{Device, LogEvent};
pub use pipeline::{RunOutput, analyze_device};
pub use sample::{Rates, Sample, SampleKind};
