//! Withdrawal forgery detection engine.
//!
//! Scans the portal for proven withdrawals, enriches each with its dispute
//! game and the trusted L2 view, classifies it and tracks open incidents
//! across polling cycles.

pub mod cache;
pub mod enrich;
pub mod error;
pub mod pipeline;
pub mod scanner;
pub mod state;
pub mod validate;

pub use cache::{DisputeGameCache, DEFAULT_GAME_CACHE_CAPACITY};
pub use error::DetectorError;
pub use pipeline::{CycleReport, Detector};
pub use scanner::{block_near_timestamp, resolve_start_height, ScanWindow};
pub use state::{
    Bucket, CycleBatch, MonitorState, ScannedRange, Transition, Validated,
    SUSPICIOUS_EVENTS_CAPACITY,
};
pub use validate::{validate, ValidationOutcome};
