//! genqueue library crate.
//!
//! Admission and strictly serialized execution of accelerator-bound video
//! generation jobs, plus the HTTP surface that submits and tracks them.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod queue;

pub use error::{Error, Result};
