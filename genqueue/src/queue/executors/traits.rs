//! Executor trait and related types.

use async_trait::async_trait;

use crate::Result;
use crate::queue::job::{GenerationRequest, JobId};

/// Input handed to an executor for one job.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub request: GenerationRequest,
}

/// Terminal outcome reported by an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The pipeline produced an artifact the storage layer can resolve.
    Success { artifact_ref: String },
    /// The pipeline rejected or could not finish the request.
    Failure { reason: String },
}

impl ExecutionOutcome {
    pub fn success(artifact_ref: impl Into<String>) -> Self {
        Self::Success {
            artifact_ref: artifact_ref.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }
}

/// The long-running generation pipeline.
///
/// The worker calls `run` exactly once per job, without holding the queue lock.
/// An `Err` (or a panic) is treated as an unexpected fault and recorded on the
/// job as a failure; it never stops the worker.
#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    /// Executor name, for logs.
    fn name(&self) -> &'static str;

    /// Run the pipeline for one job and report its outcome.
    async fn run(&self, ctx: &JobContext) -> Result<ExecutionOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        assert_eq!(
            ExecutionOutcome::success("videos/a.mp4"),
            ExecutionOutcome::Success {
                artifact_ref: "videos/a.mp4".to_string()
            }
        );
        assert_eq!(
            ExecutionOutcome::failure("bad input"),
            ExecutionOutcome::Failure {
                reason: "bad input".to_string()
            }
        );
    }
}
