//! In-memory job queue manager.
//!
//! All scheduling state (backlog, job table, active dedup keys, worker flag)
//! lives in one [`QueueState`] behind a single lock. Every operation holds the
//! lock only for bookkeeping; pipeline runs happen in the worker with the lock
//! released.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::executors::{ExecutionOutcome, JobContext, PipelineExecutor};
use super::job::{
    DedupKey, EnqueueOutcome, GenerationRequest, Job, JobId, JobStatus, QueueStats, StatusView,
};
use super::worker;
use crate::{Error, Result};

/// Default number of jobs allowed to wait in the backlog.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Default time to wait for the in-flight job on shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure reason recorded on a job whose run was cut short by shutdown.
const SHUTDOWN_ABORT_REASON: &str = "aborted by shutdown";

/// Configuration for the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobQueueConfig {
    /// Maximum number of queued (not yet processing) jobs.
    pub capacity: usize,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl JobQueueConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// Scheduling state guarded by the manager lock.
#[derive(Default)]
pub(crate) struct QueueState {
    /// Jobs not yet started, in arrival order.
    backlog: VecDeque<JobId>,
    /// Every job ever admitted and not purged.
    jobs: HashMap<JobId, Job>,
    /// Dedup keys of queued and processing jobs.
    active_keys: HashMap<DedupKey, JobId>,
    worker_running: bool,
    worker_handle: Option<JoinHandle<()>>,
    closed: bool,
}

impl QueueState {
    fn renumber_backlog(&mut self) {
        for (index, id) in self.backlog.iter().enumerate() {
            if let Some(job) = self.jobs.get_mut(id) {
                job.queue_position = index + 1;
            }
        }
    }

    /// Pop the backlog head and mark it processing.
    ///
    /// Returns `None` when the backlog is empty or the queue is closed; the
    /// caller must then release the worker flag under the same lock.
    pub(crate) fn start_next(&mut self) -> Option<JobContext> {
        if self.closed {
            return None;
        }

        while let Some(job_id) = self.backlog.pop_front() {
            let Some(job) = self.jobs.get_mut(&job_id) else {
                warn!(job_id = %job_id, "Backlog entry without a job record, skipping");
                continue;
            };
            if let Err(e) = job.mark_processing() {
                warn!(job_id = %job_id, "Skipping backlog entry: {}", e);
                continue;
            }
            let ctx = JobContext {
                job_id,
                request: job.request.clone(),
            };
            self.renumber_backlog();
            return Some(ctx);
        }

        None
    }

    /// Record the terminal state of a processing job and release its dedup key.
    pub(crate) fn finish(&mut self, job_id: &JobId, outcome: ExecutionOutcome) {
        let Some(job) = self.jobs.get_mut(job_id) else {
            warn!(job_id = %job_id, "Finished job no longer tracked");
            return;
        };

        let recorded = match outcome {
            ExecutionOutcome::Success { artifact_ref } => job.mark_completed(artifact_ref),
            ExecutionOutcome::Failure { reason } => job.mark_failed(reason),
        };
        if let Err(e) = recorded {
            error!(job_id = %job_id, "Failed to record job outcome: {}", e);
            return;
        }

        debug!(
            job_id = %job_id,
            status = %job.status,
            queue_wait_secs = ?job.queue_wait_secs(),
            duration_secs = ?job.duration_secs(),
            "Recorded job outcome"
        );

        if !job.status.is_active() && self.active_keys.get(&job.dedup_key) == Some(job_id) {
            self.active_keys.remove(&job.dedup_key);
        }
    }

    /// Fail the processing job, if any. Used when its worker was aborted.
    pub(crate) fn fail_in_flight(&mut self, reason: &str) -> Option<JobId> {
        let job_id = self
            .jobs
            .values()
            .find(|job| job.status == JobStatus::Processing)
            .map(|job| job.id.clone())?;
        self.finish(&job_id, ExecutionOutcome::failure(reason));
        Some(job_id)
    }

    /// Clear the worker flag. Called by the worker when it exits.
    pub(crate) fn release_worker(&mut self) {
        self.worker_running = false;
    }
}

/// Shared between the manager and its worker task.
pub(crate) struct Shared {
    pub(crate) state: Mutex<QueueState>,
    pub(crate) executor: Arc<dyn PipelineExecutor>,
}

/// Admits generation requests and runs them one at a time in arrival order.
///
/// A single worker task is spawned lazily by [`enqueue`](Self::enqueue) when
/// none is running, and exits once the backlog is empty.
pub struct JobQueueManager {
    config: JobQueueConfig,
    shared: Arc<Shared>,
}

impl JobQueueManager {
    /// Create a new manager that runs jobs through `executor`.
    pub fn new(config: JobQueueConfig, executor: Arc<dyn PipelineExecutor>) -> Arc<Self> {
        info!(
            "Job queue created (capacity: {}, executor: {})",
            config.capacity,
            executor.name()
        );
        Arc::new(Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                executor,
            }),
        })
    }

    /// Admit a request.
    ///
    /// Fails with [`Error::QueueFull`] when the backlog is at capacity. When an
    /// equivalent request is already queued or processing, returns
    /// [`EnqueueOutcome::Duplicate`] pointing at it instead of adding a job.
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, request: GenerationRequest) -> Result<EnqueueOutcome> {
        let dedup_key = request.dedup_key();
        let mut state = self.shared.state.lock();

        if state.closed {
            return Err(Error::QueueClosed);
        }

        if state.backlog.len() >= self.config.capacity {
            warn!(
                "Rejecting request: queue is full ({} waiting)",
                state.backlog.len()
            );
            return Err(Error::QueueFull {
                capacity: self.config.capacity,
            });
        }

        if let Some(existing) = state.active_keys.get(&dedup_key) {
            info!(job_id = %existing, "Duplicate request, returning existing job");
            return Ok(EnqueueOutcome::Duplicate {
                job_id: existing.clone(),
            });
        }

        let runtime = if state.worker_running {
            None
        } else {
            Some(Handle::try_current().map_err(|e| {
                Error::Other(format!("Job queue requires a Tokio runtime: {}", e))
            })?)
        };

        let queue_position = state.backlog.len() + 1;
        let job = Job::new(request, dedup_key.clone(), queue_position);
        let job_id = job.id.clone();

        state.backlog.push_back(job_id.clone());
        state.active_keys.insert(dedup_key, job_id.clone());
        state.jobs.insert(job_id.clone(), job);

        info!(
            job_id = %job_id,
            "Enqueued job at position {}", queue_position
        );

        if let Some(runtime) = runtime {
            state.worker_running = true;
            state.worker_handle = Some(runtime.spawn(worker::run(self.shared.clone())));
            debug!("Spawned queue worker");
        }

        Ok(EnqueueOutcome::Accepted {
            job_id,
            queue_position,
        })
    }

    /// Current status of a job.
    pub fn status(&self, job_id: &str) -> Result<StatusView> {
        let state = self.shared.state.lock();
        state
            .jobs
            .get(job_id)
            .map(Job::status_view)
            .ok_or_else(|| Error::not_found("Job", job_id))
    }

    /// Snapshot of a job record.
    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.shared.state.lock().jobs.get(job_id).cloned()
    }

    /// Job ids currently waiting, in the order they will run.
    pub fn backlog(&self) -> Vec<JobId> {
        self.shared.state.lock().backlog.iter().cloned().collect()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.shared.state.lock();
        let mut stats = QueueStats {
            capacity: self.config.capacity,
            worker_running: state.worker_running,
            ..Default::default()
        };
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn is_worker_running(&self) -> bool {
        self.shared.state.lock().worker_running
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Drop terminal jobs that finished before `cutoff`.
    ///
    /// Queued and processing jobs are never removed. Returns the number of
    /// jobs dropped.
    pub fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.shared.state.lock();
        let before = state.jobs.len();
        state.jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.finished_at.is_some_and(|at| at < cutoff))
        });
        before - state.jobs.len()
    }

    /// Stop admitting jobs and wait for the in-flight job to finish.
    pub async fn shutdown(&self) {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Stop admitting jobs and wait up to `timeout` for the in-flight job.
    ///
    /// The worker does not start another job after this is called. Jobs still
    /// in the backlog stay queued. If the in-flight job outlives the timeout
    /// the worker task is aborted and the job is recorded as failed.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) {
        info!("Shutting down job queue (timeout: {:?})", timeout);

        let handle = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.worker_handle.take()
        };

        if let Some(mut handle) = handle {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Queue worker ended abnormally: {}", e),
                Err(_) => {
                    warn!("Shutdown timeout reached, aborting queue worker");
                    handle.abort();
                    let _ = handle.await;

                    let mut state = self.shared.state.lock();
                    state.release_worker();
                    if let Some(job_id) = state.fail_in_flight(SHUTDOWN_ABORT_REASON) {
                        warn!(job_id = %job_id, "In-flight job aborted by shutdown");
                    }
                }
            }
        }

        let remaining = self.shared.state.lock().backlog.len();
        if remaining > 0 {
            warn!("{} queued jobs were not started", remaining);
        }
        info!("Job queue shut down");
    }
}
