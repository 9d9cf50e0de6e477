//! 设备实体
//! Device entity

use crate::device::{Device, DeviceStatus, ManualStatus};
use sea_orm::entity::prelude::*;

/// 设备状态列枚举
/// Device status column enum
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum DeviceState {
  #[sea_orm(string_value = "idle")]
  Idle,
  #[sea_orm(string_value = "busy")]
  Busy,
  #[sea_orm(string_value = "maintenance")]
  Maintenance,
  #[sea_orm(string_value = "error")]
  Error,
  #[sea_orm(string_value = "offline")]
  Offline,
}

impl From<DeviceStatus> for DeviceState {
  fn from(status: DeviceStatus) -> Self {
    match status {
      DeviceStatus::Idle => DeviceState::Idle,
      DeviceStatus::Busy => DeviceState::Busy,
      DeviceStatus::Maintenance => DeviceState::Maintenance,
      DeviceStatus::Error => DeviceState::Error,
      DeviceStatus::Offline => DeviceState::Offline,
    }
  }
}

impl From<DeviceState> for DeviceStatus {
  fn from(state: DeviceState) -> Self {
    match state {
      DeviceState::Idle => DeviceStatus::Idle,
      DeviceState::Busy => DeviceStatus::Busy,
      DeviceState::Maintenance => DeviceStatus::Maintenance,
      DeviceState::Error => DeviceStatus::Error,
      DeviceState::Offline => DeviceStatus::Offline,
    }
  }
}

/// 人工覆盖状态列枚举
/// Manual override column enum
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum ManualState {
  #[sea_orm(string_value = "maintenance")]
  Maintenance,
  #[sea_orm(string_value = "error")]
  Error,
}

impl From<ManualStatus> for ManualState {
  fn from(status: ManualStatus) -> Self {
    match status {
      ManualStatus::Maintenance => ManualState::Maintenance,
      ManualStatus::Error => ManualState::Error,
    }
  }
}

impl From<ManualState> for ManualStatus {
  fn from(state: ManualState) -> Self {
    match state {
      ManualState::Maintenance => ManualStatus::Maintenance,
      ManualState::Error => ManualStatus::Error,
    }
  }
}

/// 设备实体模型
/// Device entity model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "loomq_devices")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  #[sea_orm(unique)]
  pub device_code: String,
  pub name: String,
  pub model: Option<String>,
  pub location: Option<String>,
  pub status: DeviceState,
  pub last_heartbeat_at: Option<DateTimeWithTimeZone>,
  pub manual_status: Option<ManualState>,
  pub manual_status_expires_at: Option<DateTimeWithTimeZone>,
  pub task_id: Option<String>,
  pub task_name: Option<String>,
  pub task_progress: i32,
  pub task_started_at: Option<DateTimeWithTimeZone>,
  #[sea_orm(nullable)]
  pub metrics: Option<serde_json::Value>,
  pub queue_timeout_active_entry_id: Option<i64>,
  pub queue_timeout_deadline_at: Option<DateTimeWithTimeZone>,
  pub queue_timeout_extended_count: i32,
  pub queue_timeout_reminded_at: Option<DateTimeWithTimeZone>,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Device {
  fn from(model: Model) -> Self {
    Device {
      id: model.id,
      device_code: model.device_code,
      name: model.name,
      model: model.model,
      location: model.location,
      status: model.status.into(),
      last_heartbeat_at: model.last_heartbeat_at.map(Into::into),
      manual_status: model.manual_status.map(Into::into),
      manual_status_expires_at: model.manual_status_expires_at.map(Into::into),
      task_id: model.task_id,
      task_name: model.task_name,
      task_progress: model.task_progress,
      task_started_at: model.task_started_at.map(Into::into),
      metrics: model.metrics,
      queue_timeout_active_entry_id: model.queue_timeout_active_entry_id,
      queue_timeout_deadline_at: model.queue_timeout_deadline_at.map(Into::into),
      queue_timeout_extended_count: model.queue_timeout_extended_count,
      queue_timeout_reminded_at: model.queue_timeout_reminded_at.map(Into::into),
      created_at: model.created_at.into(),
    }
  }
}
