//! Job model: payload, identifiers, lifecycle state and status views.

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Unique job identifier, generated at admission and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Narrator voice used by the generation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Levitan,
    Anton,
    Vysotskaya,
    Bergholz,
    Hmara,
}

impl Speaker {
    pub const ALL: [Speaker; 5] = [
        Speaker::Levitan,
        Speaker::Anton,
        Speaker::Vysotskaya,
        Speaker::Bergholz,
        Speaker::Hmara,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Levitan => "levitan",
            Speaker::Anton => "anton",
            Speaker::Vysotskaya => "vysotskaya",
            Speaker::Bergholz => "bergholz",
            Speaker::Hmara => "hmara",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Speaker {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Speaker::ALL
            .into_iter()
            .find(|speaker| speaker.as_str() == s)
            .ok_or_else(|| Error::validation(format!("Unknown speaker: '{}'", s)))
    }
}

/// Request payload for one generation run.
///
/// The queue only looks at `letter`, and only to fingerprint it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub letter: String,
    pub speaker: Speaker,
    pub music: bool,
    pub subtitles: bool,
}

impl GenerationRequest {
    pub fn new(letter: impl Into<String>, speaker: Speaker) -> Self {
        Self {
            letter: letter.into(),
            speaker,
            music: true,
            subtitles: true,
        }
    }

    pub fn with_music(mut self, music: bool) -> Self {
        self.music = music;
        self
    }

    pub fn with_subtitles(mut self, subtitles: bool) -> Self {
        self.subtitles = subtitles;
        self
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::from_letter(&self.letter)
    }
}

/// Fingerprint of a letter used to detect resubmissions.
///
/// Letters that differ only in case or surrounding whitespace share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn from_letter(letter: &str) -> Self {
        let normalized = letter.trim().to_lowercase();
        Self(hex::encode(Md5::digest(normalized.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the backlog.
    Queued,
    /// Owned by the worker; the pipeline is running.
    Processing,
    /// Pipeline produced an artifact.
    Completed,
    /// Pipeline reported a failure or faulted.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Queued and processing jobs hold their dedup key.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job in the queue.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub request: GenerationRequest,
    pub dedup_key: DedupKey,
    pub status: JobStatus,
    /// 1-based position in the backlog, 0 once the job has left it.
    pub queue_position: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set only when `status == Failed`.
    pub error: Option<String>,
    /// Set only when `status == Completed`.
    pub artifact_ref: Option<String>,
}

impl Job {
    pub(crate) fn new(
        request: GenerationRequest,
        dedup_key: DedupKey,
        queue_position: usize,
    ) -> Self {
        Self {
            id: JobId::new(),
            request,
            dedup_key,
            status: JobStatus::Queued,
            queue_position,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            artifact_ref: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn mark_processing(&mut self) -> Result<()> {
        self.transition(JobStatus::Processing)?;
        self.queue_position = 0;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn mark_completed(&mut self, artifact_ref: String) -> Result<()> {
        self.transition(JobStatus::Completed)?;
        self.finished_at = Some(Utc::now());
        self.artifact_ref = Some(artifact_ref);
        Ok(())
    }

    pub(crate) fn mark_failed(&mut self, reason: String) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.finished_at = Some(Utc::now());
        self.error = Some(reason);
        Ok(())
    }

    /// Seconds spent in the backlog before the worker picked the job up.
    pub fn queue_wait_secs(&self) -> Option<f64> {
        self.started_at
            .map(|started| (started - self.created_at).num_milliseconds().max(0) as f64 / 1000.0)
    }

    /// Seconds the pipeline ran for.
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => {
                Some((finished - started).num_milliseconds().max(0) as f64 / 1000.0)
            }
            _ => None,
        }
    }

    pub fn status_view(&self) -> StatusView {
        StatusView {
            status: self.status,
            queue_position: if self.status == JobStatus::Queued {
                self.queue_position
            } else {
                0
            },
            error: match self.status {
                JobStatus::Failed => self.error.clone(),
                _ => None,
            },
            artifact_ref: match self.status {
                JobStatus::Completed => self.artifact_ref.clone(),
                _ => None,
            },
        }
    }
}

/// Point-in-time status of a job as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    pub status: JobStatus,
    pub queue_position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
}

/// Result of a successful `enqueue` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new job was appended to the backlog.
    Accepted { job_id: JobId, queue_position: usize },
    /// An equivalent job is already queued or processing.
    Duplicate { job_id: JobId },
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> &JobId {
        match self {
            EnqueueOutcome::Accepted { job_id, .. } | EnqueueOutcome::Duplicate { job_id } => {
                job_id
            }
        }
    }

    /// Position assigned at admission; duplicates report 0.
    pub fn queue_position(&self) -> usize {
        match self {
            EnqueueOutcome::Accepted { queue_position, .. } => *queue_position,
            EnqueueOutcome::Duplicate { .. } => 0,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, EnqueueOutcome::Duplicate { .. })
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub capacity: usize,
    pub worker_running: bool,
}
