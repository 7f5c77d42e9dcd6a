//! API request and response models (DTOs).

use serde::{Deserialize, Serialize};

use crate::queue::{EnqueueOutcome, GenerationRequest, JobId, QueueStats, Speaker};
use crate::{Error, Result};

/// Minimum letter length, in characters, after trimming.
pub const LETTER_MIN_CHARS: usize = 100;

/// Maximum letter length, in characters, after trimming.
pub const LETTER_MAX_CHARS: usize = 3000;

fn default_true() -> bool {
    true
}

/// Request body for `POST /api/generate_video`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateVideoRequest {
    pub letter: String,
    pub speaker: String,
    #[serde(default = "default_true")]
    pub music: bool,
    #[serde(default = "default_true")]
    pub subtitles: bool,
}

impl GenerateVideoRequest {
    /// Validate the request and convert it into a queue payload.
    pub fn validate(self) -> Result<GenerationRequest> {
        let letter = self.letter.trim();
        let chars = letter.chars().count();

        if chars == 0 {
            return Err(Error::validation("letter must not be blank"));
        }
        if chars < LETTER_MIN_CHARS {
            return Err(Error::validation(format!(
                "letter must be at least {} characters (got {})",
                LETTER_MIN_CHARS, chars
            )));
        }
        if chars > LETTER_MAX_CHARS {
            return Err(Error::validation(format!(
                "letter must be at most {} characters (got {})",
                LETTER_MAX_CHARS, chars
            )));
        }

        let speaker: Speaker = self.speaker.trim().parse()?;

        Ok(GenerationRequest::new(letter, speaker)
            .with_music(self.music)
            .with_subtitles(self.subtitles))
    }
}

/// Response for an accepted or deduplicated submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub message: String,
    pub job_id: JobId,
    pub queue_position: usize,
}

impl From<EnqueueOutcome> for EnqueueResponse {
    fn from(outcome: EnqueueOutcome) -> Self {
        let message = if outcome.is_duplicate() {
            "This letter is already in the queue"
        } else {
            "Video queued for generation"
        };
        Self {
            message: message.to_string(),
            queue_position: outcome.queue_position(),
            job_id: outcome.job_id().clone(),
        }
    }
}

/// Current log filter directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFilter {
    pub filter: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub queue: QueueStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(letter: &str, speaker: &str) -> GenerateVideoRequest {
        GenerateVideoRequest {
            letter: letter.to_string(),
            speaker: speaker.to_string(),
            music: true,
            subtitles: false,
        }
    }

    #[test]
    fn test_defaults_for_flags() {
        let req: GenerateVideoRequest =
            serde_json::from_str(r#"{"letter": "hi", "speaker": "anton"}"#).unwrap();
        assert!(req.music);
        assert!(req.subtitles);
    }

    #[test]
    fn test_validate_accepts_and_trims() {
        let letter = format!("  {}  ", "a".repeat(LETTER_MIN_CHARS));
        let payload = request(&letter, "vysotskaya").validate().unwrap();
        assert_eq!(payload.letter.len(), LETTER_MIN_CHARS);
        assert_eq!(payload.speaker, Speaker::Vysotskaya);
        assert!(!payload.subtitles);
    }

    #[test]
    fn test_validate_length_in_characters() {
        // Cyrillic letters are two bytes each; the limit counts characters.
        let letter = "я".repeat(LETTER_MIN_CHARS);
        assert!(request(&letter, "anton").validate().is_ok());

        let short = "я".repeat(LETTER_MIN_CHARS - 1);
        assert!(matches!(
            request(&short, "anton").validate(),
            Err(Error::Validation(_))
        ));

        let long = "a".repeat(LETTER_MAX_CHARS + 1);
        assert!(request(&long, "anton").validate().is_err());
        assert!(request("    ", "anton").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_speaker() {
        let letter = "a".repeat(LETTER_MIN_CHARS);
        assert!(matches!(
            request(&letter, "narrator").validate(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_enqueue_response_from_duplicate() {
        let job_id = JobId::new();
        let response = EnqueueResponse::from(EnqueueOutcome::Duplicate {
            job_id: job_id.clone(),
        });
        assert_eq!(response.job_id, job_id);
        assert_eq!(response.queue_position, 0);
        assert!(response.message.contains("already"));
    }
}
