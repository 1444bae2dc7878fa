//! API routes

use super::error::{ApiError, ApiResult};
use crate::store::{NewStream, StreamRecord, StreamStore, StreamUpdate};
use amps_supervisor::{ProcessInfo, StreamId, Supervisor};
use dashmap::DashMap;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

const REQUIRED_FIELDS: [&str; 3] = ["name", "source", "ffmpeg_profile"];

/// Application state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StreamStore>,
    pub supervisor: Arc<Supervisor>,
    pub started: Instant,
    edits: Arc<DashMap<StreamId, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(store: Arc<StreamStore>, supervisor: Arc<Supervisor>) -> Self {
        Self {
            store,
            supervisor,
            started: Instant::now(),
            edits: Arc::new(DashMap::new()),
        }
    }

    /// Serialize work that reads a stream's definition and acts on its process.
    ///
    /// Held by updates and deletes from stopping the old process until the
    /// record changes, and by process starts from reading the record until
    /// the process is registered, so no process outlives its definition.
    pub async fn lock_stream(&self, id: StreamId) -> OwnedMutexGuard<()> {
        let lock = self.edits.entry(id).or_default().value().clone();
        lock.lock_owned().await
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub streams: usize,
    pub active_processes: usize,
}

/// Response to a stream deletion
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub message: String,
    pub stream: StreamRecord,
}

/// Create all API routes
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/streams", get(list_streams).post(create_stream))
        .route(
            "/api/streams/{id}",
            get(get_stream).put(update_stream).delete(delete_stream),
        )
        .route(
            "/api/streams/{id}/process",
            get(process_status).post(start_process).delete(stop_process),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.supervisor.is_shutting_down() {
        "shutting_down"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: crate::VERSION.to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        streams: state.store.len(),
        active_processes: state.supervisor.active_streams().len(),
    })
}

async fn list_streams(State(state): State<AppState>) -> Json<Vec<StreamRecord>> {
    Json(state.store.list())
}

async fn get_stream(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<StreamRecord>> {
    Ok(Json(state.store.get(StreamId::new(id))?))
}

async fn create_stream(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<StreamRecord>)> {
    let Json(body) = body.map_err(invalid_json)?;
    let new = parse_new_stream(body)?;

    let record = state.store.create(new)?;
    info!("Created stream {} ('{}')", record.id, record.name);
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_stream(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<StreamRecord>> {
    let id = StreamId::new(id);
    let Json(body) = body.map_err(invalid_json)?;
    if !body.is_object() {
        return Err(ApiError::BadRequest("Invalid JSON body".to_string()));
    }
    let update: StreamUpdate =
        serde_json::from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let _edit = state.lock_stream(id).await;
    state.store.validate_update(id, &update)?;

    // The running process was launched from the old definition.
    if update.affects_process() && state.supervisor.stop(id).await.is_some() {
        info!("Stopped process for stream {} before applying update", id);
    }

    Ok(Json(state.store.update(id, update)?))
}

async fn delete_stream(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<DeletedResponse>> {
    let id = StreamId::new(id);
    let _edit = state.lock_stream(id).await;
    state.store.get(id)?;

    state.supervisor.stop(id).await;
    let stream = state.store.remove(id)?;
    info!("Deleted stream {} ('{}')", stream.id, stream.name);

    Ok(Json(DeletedResponse {
        message: "Stream deleted successfully".to_string(),
        stream,
    }))
}

async fn start_process(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<ProcessInfo>> {
    let id = StreamId::new(id);
    let _edit = state.lock_stream(id).await;
    let record = state.store.get(id)?;
    let profile = state.store.profile(&record.ffmpeg_profile)?;

    let handle = state
        .supervisor
        .acquire(&record.stream_config(), profile)
        .await?;
    Ok(Json(handle.info()))
}

async fn process_status(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<ProcessInfo>> {
    let id = StreamId::new(id);
    state.store.get(id)?;

    state
        .supervisor
        .status(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Process not running".to_string()))
}

async fn stop_process(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<StatusCode> {
    let id = StreamId::new(id);
    state.store.get(id)?;

    state.supervisor.stop(id).await;
    Ok(StatusCode::NO_CONTENT)
}

fn invalid_json(rejection: JsonRejection) -> ApiError {
    tracing::debug!("Rejected request body: {}", rejection);
    ApiError::BadRequest("Invalid JSON body".to_string())
}

fn parse_new_stream(body: Value) -> ApiResult<NewStream> {
    let missing = || {
        ApiError::BadRequest(format!(
            "Missing required fields: {}",
            REQUIRED_FIELDS.join(", ")
        ))
    };

    let has_all = REQUIRED_FIELDS
        .iter()
        .all(|field| body.get(field).is_some_and(Value::is_string));
    if !has_all {
        return Err(missing());
    }

    serde_json::from_value(body).map_err(|_| missing())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_new_stream() {
        let new = parse_new_stream(json!({
            "name": "Lobby",
            "source": "rtsp://cam/1",
            "ffmpeg_profile": "copy",
            "ignored": true
        }))
        .unwrap();

        assert_eq!(new.name, "Lobby");
        assert_eq!(new.ffmpeg_profile, "copy");
    }

    #[test]
    fn test_parse_new_stream_missing_fields() {
        for body in [
            json!({}),
            json!({"name": "Lobby", "source": "rtsp://cam/1"}),
            json!({"name": "Lobby", "source": 5, "ffmpeg_profile": "copy"}),
            json!(["name", "source", "ffmpeg_profile"]),
        ] {
            let err = parse_new_stream(body).unwrap_err();
            assert_eq!(
                err.message(),
                "Missing required fields: name, source, ffmpeg_profile"
            );
        }
    }
}
