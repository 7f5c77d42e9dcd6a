//! Job queue for accelerator-bound generation requests.
//!
//! The queue is responsible for:
//! - Admission: capacity limit and duplicate detection
//! - Strict FIFO execution on a single, lazily started worker
//! - Status tracking for queued, processing and finished jobs
//! - Optional retention-based purging of finished jobs

mod executors;
mod job;
mod manager;
mod retention;
mod worker;

pub use executors::{
    CommandExecutor, CommandExecutorConfig, ExecutionOutcome, JobContext, PipelineExecutor,
};
pub use job::{
    DedupKey, EnqueueOutcome, GenerationRequest, Job, JobId, JobStatus, QueueStats, Speaker,
    StatusView,
};
pub use manager::{DEFAULT_QUEUE_CAPACITY, JobQueueConfig, JobQueueManager};
pub use retention::{RetentionConfig, RetentionService};
