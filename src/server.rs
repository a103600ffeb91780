use crate::config::AppConfig;
use crate::controller::{AppState, Command, Frame};
use crate::error::ChoroplethError;
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

pub type SharedState = Arc<Mutex<AppState>>;

#[derive(Deserialize)]
pub struct LocateParams {
    x: f64,
    y: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct LocateResponse {
    name: String,
}

pub struct ApiError(ChoroplethError);

impl From<ChoroplethError> for ApiError {
    fn from(e: ChoroplethError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ChoroplethError::UnknownCategory(_) | ChoroplethError::UnknownDistrict(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: SharedState, static_dir: &Path) -> Router {
    Router::new()
        .route("/api/frame", get(frame_handler))
        .route("/api/command", post(command_handler))
        .route("/api/locate", get(locate_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, state: AppState) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    let app = router(Arc::new(Mutex::new(state)), &config.server.static_dir);

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn lock(state: &SharedState) -> MutexGuard<'_, AppState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn frame_handler(State(state): State<SharedState>) -> Result<Json<Frame>, ApiError> {
    let frame = lock(&state).frame()?;
    Ok(Json(frame))
}

async fn command_handler(
    State(state): State<SharedState>,
    Json(command): Json<Command>,
) -> Result<Json<Frame>, ApiError> {
    let frame = lock(&state).dispatch(command)?;
    Ok(Json(frame))
}

async fn locate_handler(
    State(state): State<SharedState>,
    Query(params): Query<LocateParams>,
) -> Json<Option<LocateResponse>> {
    let guard = lock(&state);
    Json(guard.locate(params.x, params.y).map(|name| LocateResponse { name: name.to_string() }))
}
