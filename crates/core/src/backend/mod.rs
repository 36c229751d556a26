//! Conversion backends.
//!
//! A job names its backend at creation: `Standard` runs a local converter
//! process, `Pro` calls a remote document-processing service. Both produce
//! Markdown, which [`output::render`] turns into the job's output format.

mod config;
mod error;
pub mod output;
mod pro;
mod scanner;
mod standard;
mod strategy;
mod traits;
mod types;

pub use config::{BackendsConfig, ProBackendConfig, StandardBackendConfig, TimeoutTier};
pub use error::BackendError;
pub use output::{render, RenderedOutput, StructuredDocument};
pub use pro::{mime_for_extension, ProBackend};
pub use scanner::{MalwareScanner, ScanOutcome, ScannerConfig};
pub use standard::StandardBackend;
pub use strategy::BackendSet;
pub use traits::ConversionBackend;
pub use types::{Backend, BackendInput, OutputFormat};
