//! HTTP entrypoint for schedule predictions.
//!
//! - `POST /v1/predict`: suggestions for the caller identified by the bearer token
//! - `GET /v1/stats`: pipeline counters
//! - `GET /health`: liveness
//!
//! ```text
//! App ──→ POST /v1/predict ──→ ScheduleInferenceService ──→ suggestions
//! ```

use crate::error::PredictionError;
use crate::inference::{ScheduleInferenceService, ScheduleSuggestion};
use crate::telemetry::{SharedPipelineStats, StatsSnapshot};
use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub struct ServerState {
    inference: Arc<ScheduleInferenceService>,
    stats: SharedPipelineStats,
}

impl ServerState {
    pub fn new(inference: Arc<ScheduleInferenceService>, stats: SharedPipelineStats) -> Self {
        Self { inference, stats }
    }
}

/// Optional body of a prediction request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    #[serde(default, alias = "user_id")]
    pub user_id: Option<String>,
}

/// Successful prediction response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub success: bool,
    pub schedules: Vec<ScheduleSuggestion>,
    pub timestamp: DateTime<Utc>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: PredictionError) -> ApiError {
    let status = match err {
        PredictionError::Unauthenticated => StatusCode::UNAUTHORIZED,
        PredictionError::FailedPrecondition(_) => StatusCode::PRECONDITION_FAILED,
        PredictionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
}

/// Caller identity from `Authorization: Bearer <user id>`.
fn caller(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /v1/stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

/// POST /v1/predict
///
/// A `userId` in the body, when given, must name the caller.
async fn predict(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PredictResponse>, ApiError> {
    let user_id = caller(&headers).ok_or_else(|| api_error(PredictionError::Unauthenticated))?;

    let request: PredictRequest = if body.is_empty() {
        PredictRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("Invalid request body: {e}"),
                    code: "invalid-argument".to_string(),
                }),
            )
        })?
    };
    if request.user_id.as_deref().is_some_and(|id| id != user_id) {
        tracing::warn!("Prediction requested for another user");
        return Err(api_error(PredictionError::Unauthenticated));
    }

    let schedules = state.inference.predict(&user_id).await.map_err(api_error)?;

    Ok(Json(PredictResponse {
        success: true,
        schedules,
        timestamp: Utc::now(),
    }))
}

/// Build the router over `state`.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/stats", get(stats))
        .route("/v1/predict", post(predict))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::new(state))
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: ServerState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Prediction server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_caller_from_bearer() {
        assert_eq!(caller(&headers("Bearer u1")).as_deref(), Some("u1"));
        assert_eq!(caller(&headers("Bearer   ")), None);
        assert_eq!(caller(&headers("Basic abc")), None);
        assert_eq!(caller(&HeaderMap::new()), None);
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            api_error(PredictionError::Unauthenticated).0,
            StatusCode::UNAUTHORIZED
        );
        let (status, Json(body)) =
            api_error(PredictionError::FailedPrecondition("Insufficient data".to_string()));
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(body.code, "failed-precondition");
        assert_eq!(body.error, "Insufficient data");
        assert_eq!(
            api_error(PredictionError::Internal("x".to_string())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
