//! REST API server module.
//!
//! Thin HTTP adapter over the job queue: request submission, status polling,
//! queue statistics, log filter control and health checks.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
