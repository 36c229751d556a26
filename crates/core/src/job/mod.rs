//! Conversion jobs and their lifecycle.
//!
//! The job store is the only writer of job state. Every change goes through
//! [`JobStore::transition`], which rejects moves the state machine does not
//! allow:
//!
//! ```text
//! Created ──► Queued ──► Running ──► Succeeded
//!    │           │          └──────► Failed
//!    └───────────┴─────────────────► Expired
//! ```

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteJobStore;
pub use store::{CreateJobRequest, JobError, JobFilter, JobStore};
pub use types::{ConversionJob, FailureKind, JobState, JobTransition};
