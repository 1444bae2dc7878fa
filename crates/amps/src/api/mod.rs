//! REST API for stream definitions and their transcoder processes

pub mod error;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::{create_routes, AppState};
pub use server::{build_app, serve, serve_with_shutdown};
