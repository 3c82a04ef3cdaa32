//! HTTP surface: webhook intake plus broker access for the external scanner.
//!
//! - `POST /webhook` turns a push notification into a CLONE_REQUEST task.
//! - `POST /channels/{channel}/tasks` enqueues a task envelope as-is.
//! - `GET /channels/{channel}/tasks/next` takes the oldest task, or answers
//!   204 when the channel is empty.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::queue::TaskQueue;
use crate::task::{Channel, ProjectMetadata, Task};

/// Push notification body. Only the fields needed to identify the repository
/// are kept; everything else in the payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
    pub repository: PushRepository,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRepository {
    #[serde(alias = "git_url")]
    pub git_url: String,
    pub name: String,
    #[serde(alias = "full_name")]
    pub full_name: String,
    pub owner: PushOwner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushOwner {
    pub login: String,
}

impl ProjectMetadata {
    pub fn from_push(event: &PushEvent) -> Self {
        let repo = &event.repository;
        ProjectMetadata::new(&repo.git_url, &repo.owner.login, &repo.name, &repo.full_name)
    }
}

pub struct AppState {
    pub queue: Arc<dyn TaskQueue>,
}

pub enum ApiError {
    NotFound(String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(receive_push))
        .route("/health", get(health))
        .route("/channels/{channel}/tasks", post(push_task))
        .route("/channels/{channel}/tasks/next", get(next_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn receive_push(
    State(state): State<Arc<AppState>>,
    Json(event): Json<PushEvent>,
) -> Result<StatusCode, ApiError> {
    let task = Task::new(ProjectMetadata::from_push(&event), Vec::new());
    tracing::info!(
        guid = %task.guid(),
        project = %event.repository.full_name,
        git_ref = %event.git_ref,
        after = %event.after,
        "Received push"
    );
    state
        .queue
        .push(Channel::CloneRequest, task)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok(StatusCode::OK)
}

fn parse_channel(name: &str) -> Result<Channel, ApiError> {
    name.parse().map_err(ApiError::NotFound)
}

async fn push_task(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    Json(task): Json<Task>,
) -> Result<StatusCode, ApiError> {
    let channel = parse_channel(&channel)?;
    tracing::info!(channel = %channel, guid = %task.guid(), bytes = task.content.len(), "Task submitted");
    state
        .queue
        .push(channel, task)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

async fn next_task(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
) -> Result<Response, ApiError> {
    let channel = parse_channel(&channel)?;
    match state.queue.try_pop(channel).await {
        Some(task) => {
            tracing::info!(channel = %channel, guid = %task.guid(), "Task handed out");
            Ok(Json(task).into_response())
        }
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// Serve `router` on `addr` until `shutdown` resolves.
pub async fn serve(
    addr: &str,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "Webhook server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    tracing::info!("Webhook server stopped");
    Ok(())
}
