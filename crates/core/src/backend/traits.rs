//! Trait definitions for the conversion backends.

use async_trait::async_trait;
use tokio::time::Instant;

use super::error::BackendError;
use super::types::{Backend, BackendInput};

/// A backend that turns a staged document into Markdown.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Returns the name of this backend implementation.
    fn name(&self) -> &str;

    /// Which strategy this implementation serves.
    fn kind(&self) -> Backend;

    /// Converts the staged input to Markdown.
    ///
    /// Implementations must stop work and release resources once `deadline`
    /// passes. Callers also enforce the deadline from outside, so a backend
    /// that overruns is dropped.
    async fn execute(&self, input: &BackendInput, deadline: Instant)
        -> Result<String, BackendError>;

    /// Validates that the backend is properly configured and ready.
    async fn validate(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
