//! The single queue worker.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::executors::{ExecutionOutcome, JobContext, PipelineExecutor};
use super::manager::Shared;

/// Clears the worker flag if the worker task unwinds.
struct RunningGuard(Arc<Shared>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("Queue worker panicked, releasing worker slot");
            self.0.state.lock().release_worker();
        }
    }
}

/// Drain the backlog one job at a time, then exit.
///
/// Popping the next job and releasing the worker flag on an empty backlog
/// happen under the same lock `enqueue` uses to decide whether to spawn a
/// worker, so a job admitted concurrently is never left without one.
pub(crate) async fn run(shared: Arc<Shared>) {
    let _guard = RunningGuard(shared.clone());
    info!("Queue worker started");

    let mut processed = 0usize;
    loop {
        let ctx = {
            let mut state = shared.state.lock();
            match state.start_next() {
                Some(ctx) => ctx,
                None => {
                    state.release_worker();
                    break;
                }
            }
        };

        info!(
            job_id = %ctx.job_id,
            speaker = %ctx.request.speaker,
            "Processing job"
        );
        let started = Instant::now();

        let outcome = execute(shared.executor.as_ref(), &ctx).await;

        match &outcome {
            ExecutionOutcome::Success { artifact_ref } => info!(
                job_id = %ctx.job_id,
                "Job completed in {:.2}s: {}",
                started.elapsed().as_secs_f64(),
                artifact_ref
            ),
            ExecutionOutcome::Failure { reason } => warn!(
                job_id = %ctx.job_id,
                "Job failed after {:.2}s: {}",
                started.elapsed().as_secs_f64(),
                reason
            ),
        }

        shared.state.lock().finish(&ctx.job_id, outcome);
        processed += 1;
    }

    info!("Queue worker finished ({} jobs processed)", processed);
}

/// Run the executor, converting faults and panics into failures.
async fn execute(executor: &dyn PipelineExecutor, ctx: &JobContext) -> ExecutionOutcome {
    match AssertUnwindSafe(executor.run(ctx)).catch_unwind().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!(job_id = %ctx.job_id, executor = executor.name(), "Pipeline fault: {}", e);
            ExecutionOutcome::failure(e.to_string())
        }
        Err(payload) => {
            let message = panic_payload_to_string(payload.as_ref());
            error!(job_id = %ctx.job_id, executor = executor.name(), "Pipeline panicked: {}", message);
            ExecutionOutcome::failure(format!("pipeline panicked: {}", message))
        }
    }
}

fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic payload".to_string()
}
