//! # metgrid parallel
//!
//! Runs batches of independent interpolation tiles.
//!
//! This crate provides:
//! - `TileJob`: one tile's inputs and output layout, loadable from JSON
//! - `TilePool`: fixed-size rayon pool executing jobs, one report per job
//! - `LogQueue`: worker log records, including captured `tracing` events,
//!   drained by a single consumer thread

pub mod job;
pub mod log_queue;
pub mod pool;

pub use job::{load_jobs, TileJob, TileReport, TileStatus};
pub use log_queue::{LogLevel, LogQueue, LogRecord, LogSink, SinkLayer};
pub use pool::{TilePool, DEFAULT_WORKERS};
