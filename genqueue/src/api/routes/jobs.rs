//! Generation job routes.
//!
//! - `POST /api/generate_video` submits a letter for generation
//! - `GET /api/video_status/{job_id}` reports job progress
//! - `GET /api/queue/stats` summarizes the queue

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::api::error::ApiResult;
use crate::api::models::{EnqueueResponse, GenerateVideoRequest};
use crate::api::server::AppState;
use crate::queue::{QueueStats, StatusView};

/// Create the job router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate_video", post(generate_video))
        .route("/video_status/{job_id}", get(video_status))
        .route("/queue/stats", get(queue_stats))
}

/// Submit a generation request.
///
/// Returns 202 for a newly queued job and 200 when the letter is already
/// queued or processing.
async fn generate_video(
    State(state): State<AppState>,
    Json(request): Json<GenerateVideoRequest>,
) -> ApiResult<(StatusCode, Json<EnqueueResponse>)> {
    let request = request.validate()?;
    let outcome = state.job_manager.enqueue(request)?;

    let status = if outcome.is_duplicate() {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(EnqueueResponse::from(outcome))))
}

async fn video_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StatusView>> {
    Ok(Json(state.job_manager.status(&job_id)?))
}

async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.job_manager.stats())
}
