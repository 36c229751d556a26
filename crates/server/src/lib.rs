//! HTTP surface of the mdraft conversion service.

pub mod api;
pub mod metrics;
pub mod state;
