//! Conversion engine: submission, worker pool and maintenance.
//!
//! The engine is the only component that moves jobs between states. It
//! validates uploads, gates them on entitlement and quota, hands them to a
//! bounded pool of workers and settles each job exactly once.

mod config;
mod runner;
mod types;

pub use config::{LimitsConfig, WorkerConfig};
pub use runner::{ConversionEngine, EngineDeps};
pub use types::{
    output_filename, BatchFile, BatchReceipt, BatchRequest, BatchStatus, EngineError,
    EngineStatus, JobResult, MaintenanceReport, NotFoundKind, RejectedFile, SubmitRequest,
    UsageReport,
};
