use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use axum::Json;
use axum::extract::{Path as AxPath, Query, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::bulk::types::{BulkRequest, OperationResult};
use crate::bulk::{execute_copy, execute_delete, execute_move};
use crate::error::ApiError;
use crate::history::{self, HistoryItem};
use crate::search::{self, SearchParams, TypeFilter};
use crate::single_file;
use crate::task_manager::TaskManager;

type ExecuteFn = fn(BulkRequest, &TaskManager, &str, Arc<AtomicBool>) -> Result<OperationResult, ApiError>;

/// Spawns a bulk operation. `async_mode` returns `{status:"async", task_id}`
/// immediately and lets the operation run to completion on a blocking
/// thread; otherwise this awaits the same blocking call and returns its
/// `OperationResult` directly.
async fn dispatch_bulk(
    task_manager: &TaskManager,
    req: BulkRequest,
    async_mode: bool,
    execute: ExecuteFn,
) -> Result<Response, ApiError> {
    let initial_total = (req.sources.len() as u64).max(1) * 50;
    let (task_id, cancel_flag) = task_manager.create(initial_total);

    if async_mode {
        let task_manager = task_manager.clone();
        let id = task_id.clone();
        tokio::task::spawn_blocking(move || {
            let _ = execute(req, &task_manager, &id, cancel_flag);
        });
        return Ok(Json(json!({"status": "async", "task_id": task_id})).into_response());
    }

    let task_manager = task_manager.clone();
    let id = task_id.clone();
    let result = tokio::task::spawn_blocking(move || execute(req, &task_manager, &id, cancel_flag))
        .await
        .map_err(|e| ApiError::Internal { message: e.to_string() })??;
    Ok(Json(result).into_response())
}

#[derive(Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Serialize)]
struct FilesResponse {
    #[serde(rename = "type")]
    kind: &'static str,
    items: Vec<single_file::FileEntry>,
}

pub async fn list_files(State(state): State<AppState>, Query(q): Query<PathQuery>) -> Result<Response, ApiError> {
    let dir = state.path_safety.resolve(&q.path)?;
    let items = single_file::list(&dir)?;
    Ok(Json(FilesResponse { kind: "directory", items }).into_response())
}

#[derive(Serialize)]
struct ProbeResponse {
    path: String,
    #[serde(rename = "type")]
    kind: &'static str,
    parent: Option<String>,
}

pub async fn path_info(State(state): State<AppState>, Query(q): Query<PathQuery>) -> Result<Response, ApiError> {
    let resolved = state.path_safety.resolve(&q.path)?;
    let metadata = std::fs::symlink_metadata(&resolved);
    let kind = match metadata {
        Ok(m) if m.is_dir() => "directory",
        Ok(_) => "file",
        Err(_) => "not_found",
    };
    let parent = if kind == "not_found" {
        resolved.parent().map(|p| p.to_string_lossy().to_string())
    } else {
        None
    };
    Ok(Json(ProbeResponse {
        path: resolved.to_string_lossy().to_string(),
        kind,
        parent,
    })
    .into_response())
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub path: String,
    pub query: String,
    #[serde(default)]
    pub depth: u32,
    pub ignore: Option<String>,
    pub max_results: Option<usize>,
    pub file_type: Option<String>,
}

pub async fn search(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> Result<Response, ApiError> {
    let start = state.path_safety.resolve(&q.path)?;
    let ignore_patterns: Vec<String> = q
        .ignore
        .as_deref()
        .map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    let type_filter = match q.file_type.as_deref() {
        Some("file") => TypeFilter::File,
        Some("directory") => TypeFilter::Directory,
        _ => TypeFilter::All,
    };
    let params = SearchParams {
        query: &q.query,
        start_path: &start,
        max_depth: q.depth,
        ignore_patterns: &ignore_patterns,
        max_results: q.max_results.unwrap_or(1000),
        type_filter,
    };
    let items = search::search(&params)?;
    Ok(Json(json!({ "items": items })).into_response())
}

#[derive(Deserialize)]
pub struct CreateFolderRequest {
    pub path: String,
    pub name: String,
}

pub async fn create_folder(
    State(state): State<AppState>,
    Json(req): Json<CreateFolderRequest>,
) -> Result<Response, ApiError> {
    let parent = state.path_safety.resolve(&req.path)?;
    let created = single_file::create_folder(&parent, &req.name)?;
    Ok(Json(json!({ "path": created.to_string_lossy() })).into_response())
}

#[derive(Deserialize)]
pub struct CreateFileRequest {
    pub path: String,
    pub name: String,
    pub content: Option<String>,
}

pub async fn create_file(
    State(state): State<AppState>,
    Json(req): Json<CreateFileRequest>,
) -> Result<Response, ApiError> {
    let parent = state.path_safety.resolve(&req.path)?;
    let created = single_file::create_file(&parent, &req.name, req.content.as_deref())?;
    Ok(Json(json!({ "path": created.to_string_lossy() })).into_response())
}

#[derive(Deserialize)]
pub struct UpdateFileRequest {
    pub path: String,
    pub content: String,
}

pub async fn update_file(
    State(state): State<AppState>,
    Json(req): Json<UpdateFileRequest>,
) -> Result<Response, ApiError> {
    let file = state.path_safety.resolve(&req.path)?;
    single_file::write_text(&file, &req.content)?;
    Ok(Json(json!({ "status": "ok" })).into_response())
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub old_path: String,
    pub new_name: String,
}

pub async fn rename(State(state): State<AppState>, Json(req): Json<RenameRequest>) -> Result<Response, ApiError> {
    let old = state.path_safety.resolve(&req.old_path)?;
    let parent = old.parent().ok_or_else(|| ApiError::BadRequest {
        message: "can't rename the confinement root".to_string(),
    })?;
    let new_path = parent.join(req.new_name.trim());
    single_file::rename(&old, &new_path)?;
    Ok(Json(json!({ "path": new_path.to_string_lossy() })).into_response())
}

#[derive(Deserialize)]
pub struct DeleteOneRequest {
    pub path: String,
    #[serde(default)]
    pub async_mode: bool,
}

pub async fn delete_one(
    State(state): State<AppState>,
    Json(req): Json<DeleteOneRequest>,
) -> Result<Response, ApiError> {
    let target = state.path_safety.resolve(&req.path)?;
    let bulk_req = BulkRequest {
        sources: vec![target],
        destination: None,
        overwrite: false,
        verify_checksum: false,
    };
    dispatch_bulk(&state.task_manager, bulk_req, req.async_mode, execute_delete).await
}

#[derive(Deserialize)]
pub struct DeleteBatchRequest {
    pub paths: Vec<String>,
    #[serde(default)]
    pub async_mode: bool,
}

pub async fn delete_batch(
    State(state): State<AppState>,
    Json(req): Json<DeleteBatchRequest>,
) -> Result<Response, ApiError> {
    let sources = resolve_all(&state, &req.paths)?;
    let bulk_req = BulkRequest {
        sources,
        destination: None,
        overwrite: false,
        verify_checksum: false,
    };
    dispatch_bulk(&state.task_manager, bulk_req, req.async_mode, execute_delete).await
}

#[derive(Deserialize)]
pub struct CopyMoveBatchRequest {
    pub src_paths: Vec<String>,
    pub dest_path: String,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub verify_checksum: bool,
    #[serde(default)]
    pub async_mode: bool,
}

pub async fn copy_batch(
    State(state): State<AppState>,
    Json(req): Json<CopyMoveBatchRequest>,
) -> Result<Response, ApiError> {
    let (bulk_req, async_mode) = resolve_copy_move_request(&state, req)?;
    dispatch_bulk(&state.task_manager, bulk_req, async_mode, execute_copy).await
}

pub async fn move_batch(
    State(state): State<AppState>,
    Json(req): Json<CopyMoveBatchRequest>,
) -> Result<Response, ApiError> {
    let (bulk_req, async_mode) = resolve_copy_move_request(&state, req)?;
    dispatch_bulk(&state.task_manager, bulk_req, async_mode, execute_move).await
}

fn resolve_copy_move_request(
    state: &AppState,
    req: CopyMoveBatchRequest,
) -> Result<(BulkRequest, bool), ApiError> {
    let sources = resolve_all(state, &req.src_paths)?;
    let destination = state.path_safety.resolve(&req.dest_path)?;
    Ok((
        BulkRequest {
            sources,
            destination: Some(destination),
            overwrite: req.overwrite,
            verify_checksum: req.verify_checksum,
        },
        req.async_mode,
    ))
}

fn resolve_all(state: &AppState, paths: &[String]) -> Result<Vec<PathBuf>, ApiError> {
    paths.iter().map(|p| state.path_safety.resolve(p)).collect()
}

#[derive(Deserialize)]
pub struct CountFilesRequest {
    pub paths: Vec<String>,
    #[serde(default)]
    pub max_depth: u32,
}

pub async fn count_files(
    State(state): State<AppState>,
    Json(req): Json<CountFilesRequest>,
) -> Result<Response, ApiError> {
    let paths = resolve_all(&state, &req.paths)?;
    let count = tokio::task::spawn_blocking(move || search::count_files(&paths, req.max_depth))
        .await
        .map_err(|e| ApiError::Internal { message: e.to_string() })?;
    Ok(Json(json!({ "count": count })).into_response())
}

pub async fn task_progress(
    State(state): State<AppState>,
    AxPath(id): AxPath<String>,
) -> Result<Response, ApiError> {
    let task = state.task_manager.get(&id).ok_or_else(|| ApiError::NotFound { path: id.clone() })?;
    Ok(Json(task).into_response())
}

pub async fn task_cancel(State(state): State<AppState>, AxPath(id): AxPath<String>) -> Response {
    let cancelled = state.task_manager.cancel(&id);
    Json(json!({ "cancelled": cancelled })).into_response()
}

pub async fn get_config(State(state): State<AppState>) -> Response {
    Json(json!({
        "base_dir": state.config.base_dir.to_string_lossy(),
        "start_dir": state.config.start_dir.to_string_lossy(),
        "host": state.config.host,
        "port": state.config.port,
    }))
    .into_response()
}

pub async fn get_history(State(state): State<AppState>) -> Response {
    let path = history::default_history_path(&state.config.base_dir);
    let items = tokio::task::spawn_blocking(move || history::load(&path)).await.unwrap_or_default();
    Json(items).into_response()
}

#[derive(Deserialize)]
pub struct HistoryPayload {
    pub history: Vec<HistoryItem>,
}

pub async fn save_history(
    State(state): State<AppState>,
    Json(payload): Json<HistoryPayload>,
) -> Result<Response, ApiError> {
    let path = history::default_history_path(&state.config.base_dir);
    tokio::task::spawn_blocking(move || history::save(&path, &payload.history))
        .await
        .map_err(|e| ApiError::Internal { message: e.to_string() })??;
    Ok(Json(json!({ "status": "success" })).into_response())
}
