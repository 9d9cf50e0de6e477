//! REST handlers
//!
//! Thin glue between the HTTP surface and the coordination engine: handlers
//! deserialize the request, call the coordinator and return the result as
//! JSON, leaving status-code selection to the error type.

use crate::error::Result;
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use loomq::device::{
  DeviceSnapshot, DeviceUpdate, HeartbeatReport, ManualOverride, RegisterDevice,
};
use loomq::manager::{JoinRequest, QueueView, RepositionRequest};
use loomq::queue::QueueEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body for removing a queue entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
  /// Token of the caller asking for the removal
  pub changed_by_id: String,
}

/// Body for extending an armed timeout deadline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendRequest {
  pub changed_by: String,
  pub changed_by_id: String,
}

/// Deadline state returned after a successful extension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendResponse {
  pub deadline_at: DateTime<Utc>,
  pub extended_count: i32,
}

/// Queue length for a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountResponse {
  pub count: usize,
}

/// List all devices with their queue counts
pub async fn list_devices(
  State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeviceSnapshot>>> {
  Ok(Json(state.coordinator.list_devices().await?))
}

/// List devices whose effective status is not offline
pub async fn online_devices(
  State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeviceSnapshot>>> {
  Ok(Json(state.coordinator.online_devices().await?))
}

/// Register a new device
pub async fn register_device(
  State(state): State<Arc<AppState>>,
  Json(spec): Json<RegisterDevice>,
) -> Result<Json<DeviceSnapshot>> {
  Ok(Json(state.coordinator.register_device(spec).await?))
}

/// Fetch one device
pub async fn get_device(
  State(state): State<Arc<AppState>>,
  Path(device_id): Path<i64>,
) -> Result<Json<DeviceSnapshot>> {
  Ok(Json(state.coordinator.get_device(device_id).await?))
}

/// Update device metadata
pub async fn update_device(
  State(state): State<Arc<AppState>>,
  Path(device_id): Path<i64>,
  Json(update): Json<DeviceUpdate>,
) -> Result<Json<DeviceSnapshot>> {
  Ok(Json(state.coordinator.update_device(device_id, update).await?))
}

/// Delete a device and its queue
pub async fn delete_device(
  State(state): State<Arc<AppState>>,
  Path(device_id): Path<i64>,
) -> Result<StatusCode> {
  state.coordinator.delete_device(device_id).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// Set or clear a manual status override
pub async fn set_manual_status(
  State(state): State<Arc<AppState>>,
  Path(device_id): Path<i64>,
  Json(req): Json<ManualOverride>,
) -> Result<Json<DeviceSnapshot>> {
  Ok(Json(state.coordinator.set_manual_status(device_id, req).await?))
}

/// Ingest a heartbeat; the path segment is the device code
pub async fn heartbeat(
  State(state): State<Arc<AppState>>,
  Path(code): Path<String>,
  Json(report): Json<HeartbeatReport>,
) -> Result<Json<DeviceSnapshot>> {
  Ok(Json(state.coordinator.handle_heartbeat(&code, report).await?))
}

/// Append one or more entries to a device queue
pub async fn join_queue(
  State(state): State<Arc<AppState>>,
  Json(req): Json<JoinRequest>,
) -> Result<Json<Vec<QueueEntry>>> {
  Ok(Json(state.coordinator.queue_manager().join(req).await?))
}

/// Fetch a device queue with today's change logs
pub async fn get_queue(
  State(state): State<Arc<AppState>>,
  Path(device_id): Path<i64>,
) -> Result<Json<QueueView>> {
  Ok(Json(state.coordinator.queue_manager().queue(device_id).await?))
}

/// Fetch the queue length for a device
pub async fn queue_count(
  State(state): State<Arc<AppState>>,
  Path(device_id): Path<i64>,
) -> Result<Json<CountResponse>> {
  let count = state.coordinator.queue_manager().count(device_id).await?;
  Ok(Json(CountResponse { count }))
}

/// Move a queue entry to a new position
pub async fn reposition_entry(
  State(state): State<Arc<AppState>>,
  Path(entry_id): Path<i64>,
  Json(req): Json<RepositionRequest>,
) -> Result<Json<QueueEntry>> {
  Ok(Json(
    state
      .coordinator
      .queue_manager()
      .reposition(entry_id, req)
      .await?,
  ))
}

/// Remove a queue entry
pub async fn leave_queue(
  State(state): State<Arc<AppState>>,
  Path(entry_id): Path<i64>,
  Json(req): Json<LeaveRequest>,
) -> Result<StatusCode> {
  state
    .coordinator
    .queue_manager()
    .leave(entry_id, &req.changed_by_id)
    .await?;
  Ok(StatusCode::NO_CONTENT)
}

/// Dequeue the head entry; returns null when the queue is empty
pub async fn complete_queue(
  State(state): State<Arc<AppState>>,
  Path(device_id): Path<i64>,
) -> Result<Json<Option<QueueEntry>>> {
  Ok(Json(
    state.coordinator.queue_manager().complete(device_id).await?,
  ))
}

/// Extend the armed timeout deadline for a device
pub async fn extend_timeout(
  State(state): State<Arc<AppState>>,
  Path(device_id): Path<i64>,
  Json(req): Json<ExtendRequest>,
) -> Result<Json<ExtendResponse>> {
  let (deadline_at, extended_count) = state
    .coordinator
    .extend_timeout(device_id, &req.changed_by, &req.changed_by_id)
    .await?;
  Ok(Json(ExtendResponse {
    deadline_at,
    extended_count,
  }))
}
