//! Upload validation.
//!
//! Every upload passes through [`IntakeValidator`] before any quota is
//! reserved: the extension must be allowed for the chosen backend, the size
//! must be within that backend's ceiling, and the leading bytes must match the
//! signature expected for the extension.

mod error;
mod signature;
mod validator;

pub use error::{ContentIssue, ValidationError};
pub use signature::{family_for_extension, FileFamily, SIGNATURE_PROBE_LEN};
pub use validator::{IntakeConfig, IntakeValidator};
