//! Pipeline executors invoked by the queue worker.

mod command;
mod traits;

pub use command::{CommandExecutor, CommandExecutorConfig};
pub use traits::{ExecutionOutcome, JobContext, PipelineExecutor};
