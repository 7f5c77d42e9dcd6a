//! Logging API routes.
//!
//! View and change the active log filter at runtime.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::LogFilter;
use crate::api::server::AppState;

/// Create the logging router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_logging_config).put(update_logging_config))
}

async fn get_logging_config(State(state): State<AppState>) -> ApiResult<Json<LogFilter>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))?;

    Ok(Json(LogFilter {
        filter: logging_config.get_filter(),
    }))
}

async fn update_logging_config(
    State(state): State<AppState>,
    Json(request): Json<LogFilter>,
) -> ApiResult<Json<LogFilter>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))?;

    logging_config.set_filter(&request.filter)?;

    Ok(Json(LogFilter {
        filter: logging_config.get_filter(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use std::path::PathBuf;
    use tower::ServiceExt;
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, reload};

    use crate::logging::LoggingConfig;
    use crate::queue::{
        ExecutionOutcome, JobContext, JobQueueConfig, JobQueueManager, PipelineExecutor,
    };

    struct NoopExecutor;

    #[async_trait]
    impl PipelineExecutor for NoopExecutor {
        fn name(&self) -> &'static str {
            "noop"
        }

        async fn run(&self, _ctx: &JobContext) -> crate::Result<ExecutionOutcome> {
            Ok(ExecutionOutcome::success("videos/noop.mp4"))
        }
    }

    fn test_state() -> AppState {
        AppState::new(JobQueueManager::new(
            JobQueueConfig::default(),
            Arc::new(NoopExecutor),
        ))
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .nest("/api/logging", router())
            .with_state(state)
    }

    fn put_filter(filter: &str) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri("/api/logging")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::json!({ "filter": filter }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn logging_without_config_is_unavailable() {
        let response = app(test_state())
            .oneshot(put_filter("genqueue=debug"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn logging_filter_can_be_replaced() {
        let (layer, handle) = reload::Layer::new(EnvFilter::new("info"));
        let _subscriber = tracing_subscriber::registry().with(layer);
        let logging = Arc::new(LoggingConfig::new(handle, PathBuf::from("logs")));
        let state = test_state().with_logging_config(logging.clone());

        let response = app(state.clone())
            .oneshot(put_filter("genqueue=trace"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: LogFilter = serde_json::from_slice(&bytes).unwrap();
        assert!(body.filter.contains("genqueue=trace"));

        let response = app(state.clone())
            .oneshot(put_filter("genqueue=loud"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(logging.get_filter().contains("genqueue=trace"));

        let request = Request::builder()
            .uri("/api/logging")
            .body(Body::empty())
            .unwrap();
        let response = app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
