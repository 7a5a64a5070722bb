//! Axum intake API.
//!
//! This crate provides:
//! - Multipart upload intake that emits transformation events
//! - Liveness/readiness probes
//! - Static serving of transformation output
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
