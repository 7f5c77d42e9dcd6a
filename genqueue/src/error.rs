//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Admission rejected because the backlog is at capacity.
    #[error("Queue is full: {capacity} jobs already waiting")]
    QueueFull { capacity: usize },

    /// The manager has been shut down and no longer admits jobs.
    #[error("Queue is closed")]
    QueueClosed,

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Fault raised by a pipeline executor outside its own outcome taxonomy.
    #[error("Executor error: {0}")]
    Executor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn executor(msg: impl Into<String>) -> Self {
        Self::Executor(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_full_message() {
        let err = Error::QueueFull { capacity: 20 };
        assert_eq!(err.to_string(), "Queue is full: 20 jobs already waiting");
    }

    #[test]
    fn test_not_found_constructor() {
        let err = Error::not_found("Job", "abc");
        assert!(matches!(
            err,
            Error::NotFound { ref entity_type, ref id } if entity_type == "Job" && id == "abc"
        ));
    }
}
