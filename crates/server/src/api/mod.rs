pub mod batches;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod upload;

pub use error::{ApiError, ErrorResponse};
pub use routes::create_router;
