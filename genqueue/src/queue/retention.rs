//! Retention of finished jobs.
//!
//! Terminal jobs stay queryable after they finish. With a non-zero retention
//! window, a background task periodically drops the ones that finished longer
//! ago than the window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manager::JobQueueManager;

/// Configuration for job retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Seconds to keep completed/failed jobs.
    /// Set to 0 to retain all jobs indefinitely.
    #[serde(default)]
    pub retention_secs: u64,

    /// Interval between purge checks in seconds.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

fn default_check_interval_secs() -> u64 {
    3600 // 1 hour
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_secs: 0,
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

impl RetentionConfig {
    pub fn with_retention_secs(mut self, secs: u64) -> Self {
        self.retention_secs = secs;
        self
    }

    pub fn with_check_interval_secs(mut self, secs: u64) -> Self {
        self.check_interval_secs = secs;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.retention_secs > 0
    }

    /// Jobs finished before the returned instant are expired.
    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_enabled() {
            return None;
        }
        let window = chrono::Duration::from_std(Duration::from_secs(self.retention_secs)).ok()?;
        now.checked_sub_signed(window)
    }
}

/// Periodically purges expired jobs from a [`JobQueueManager`].
pub struct RetentionService {
    config: RetentionConfig,
    manager: Arc<JobQueueManager>,
}

impl RetentionService {
    pub fn new(config: RetentionConfig, manager: Arc<JobQueueManager>) -> Self {
        Self { config, manager }
    }

    /// Run a single purge pass. Returns the number of jobs dropped.
    pub fn run_purge(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = self.config.cutoff(now) else {
            debug!("Job retention disabled (retention_secs = 0)");
            return 0;
        };

        let purged = self.manager.purge_finished_before(cutoff);
        if purged > 0 {
            info!(
                "Purged {} finished jobs (retention: {}s)",
                purged, self.config.retention_secs
            );
        } else {
            debug!("No jobs to purge");
        }
        purged
    }

    /// Start the background purge task. Does nothing when retention is disabled.
    pub fn start_background_task(self, cancellation_token: CancellationToken) {
        if !self.config.is_enabled() {
            info!("Job retention disabled, finished jobs are kept indefinitely");
            return;
        }
        if self.config.check_interval_secs == 0 {
            warn!("Job purge interval is 0, retention task not started");
            return;
        }

        tokio::spawn(async move {
            let mut check_interval = interval(Duration::from_secs(self.config.check_interval_secs));

            info!(
                "Job retention service started (retention: {}s, interval: {}s)",
                self.config.retention_secs, self.config.check_interval_secs
            );

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        info!("Job retention service shutting down");
                        break;
                    }
                    _ = check_interval.tick() => {
                        self.run_purge(Utc::now());
                    }
                }
            }
        });
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }
}
