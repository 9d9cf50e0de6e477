//! 设备模块
//! Device module
//!
//! 定义设备记录、心跳上报以及由心跳年龄、人工覆盖和任务进度推导状态的状态机
//! Defines the device record, heartbeat reports, and the state machine that
//! derives status from heartbeat age, manual override and task progress

use crate::clock::to_chrono;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 设备状态
/// Device status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
  /// 空闲
  /// Idle
  Idle,
  /// 忙碌
  /// Busy
  Busy,
  /// 维护中
  /// Under maintenance
  Maintenance,
  /// 故障
  /// Error
  Error,
  /// 离线
  /// Offline
  Offline,
}

impl DeviceStatus {
  /// 转换为字符串表示
  /// Convert to string representation
  pub fn as_str(&self) -> &'static str {
    match self {
      DeviceStatus::Idle => "idle",
      DeviceStatus::Busy => "busy",
      DeviceStatus::Maintenance => "maintenance",
      DeviceStatus::Error => "error",
      DeviceStatus::Offline => "offline",
    }
  }
}

impl fmt::Display for DeviceStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DeviceStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "idle" => Ok(DeviceStatus::Idle),
      "busy" => Ok(DeviceStatus::Busy),
      "maintenance" => Ok(DeviceStatus::Maintenance),
      "error" => Ok(DeviceStatus::Error),
      "offline" => Ok(DeviceStatus::Offline),
      _ => Err(Error::store(format!("Unknown device status: {s}"))),
    }
  }
}

/// 人工覆盖状态，只允许维护或故障
/// Manual override status, only maintenance or error is allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualStatus {
  /// 维护中
  /// Under maintenance
  Maintenance,
  /// 故障
  /// Error
  Error,
}

impl ManualStatus {
  /// 转换为字符串表示
  /// Convert to string representation
  pub fn as_str(&self) -> &'static str {
    match self {
      ManualStatus::Maintenance => "maintenance",
      ManualStatus::Error => "error",
    }
  }
}

impl FromStr for ManualStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "maintenance" => Ok(ManualStatus::Maintenance),
      "error" => Ok(ManualStatus::Error),
      _ => Err(Error::store(format!("Unknown manual status: {s}"))),
    }
  }
}

impl From<ManualStatus> for DeviceStatus {
  fn from(manual: ManualStatus) -> Self {
    match manual {
      ManualStatus::Maintenance => DeviceStatus::Maintenance,
      ManualStatus::Error => DeviceStatus::Error,
    }
  }
}

/// 设备记录
/// Device record
///
/// 心跳子系统与队列子系统写入互不相交的字段集合
/// The heartbeat and queue subsystems mutate disjoint field sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
  pub id: i64,
  /// 操作员分配的唯一设备编号
  /// Unique operator-assigned device code
  pub device_code: String,
  pub name: String,
  pub model: Option<String>,
  pub location: Option<String>,
  /// 最近一次持久化的状态
  /// Last persisted status
  pub status: DeviceStatus,
  pub last_heartbeat_at: Option<DateTime<Utc>>,
  pub manual_status: Option<ManualStatus>,
  pub manual_status_expires_at: Option<DateTime<Utc>>,
  pub task_id: Option<String>,
  pub task_name: Option<String>,
  /// 任务进度 0–100
  /// Task progress 0-100
  pub task_progress: i32,
  pub task_started_at: Option<DateTime<Utc>>,
  /// 设备自报的指标负载，原样透传
  /// Device-reported metrics payload, passed through verbatim
  pub metrics: Option<serde_json::Value>,
  pub queue_timeout_active_entry_id: Option<i64>,
  pub queue_timeout_deadline_at: Option<DateTime<Utc>>,
  pub queue_timeout_extended_count: i32,
  pub queue_timeout_reminded_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

impl Device {
  /// 未过期的人工覆盖状态
  /// The manual override, if set and not expired
  pub fn manual_status_active(&self, now: DateTime<Utc>) -> Option<ManualStatus> {
    let manual = self.manual_status?;
    match self.manual_status_expires_at {
      Some(expires_at) if now >= expires_at => None,
      _ => Some(manual),
    }
  }

  /// 心跳是否已超过离线阈值，从未有心跳视为过期
  /// Whether the heartbeat is older than the offline threshold; no heartbeat counts as stale
  pub fn is_stale(&self, now: DateTime<Utc>, offline_threshold: Duration) -> bool {
    match self.last_heartbeat_at {
      Some(last) => now.signed_duration_since(last) > to_chrono(offline_threshold),
      None => true,
    }
  }

  /// 按优先级推导状态：离线 > 人工覆盖 > 由进度得出忙碌或空闲
  /// Resolve status by precedence: offline > manual override > busy/idle from progress
  pub fn resolve_status(&self, now: DateTime<Utc>, offline_threshold: Duration) -> DeviceStatus {
    if self.is_stale(now, offline_threshold) {
      return DeviceStatus::Offline;
    }
    if let Some(manual) = self.manual_status_active(now) {
      return manual.into();
    }
    if self.task_progress > 0 {
      DeviceStatus::Busy
    } else {
      DeviceStatus::Idle
    }
  }

  /// 清除全部超时字段，返回是否有字段被清除
  /// Clear all timeout fields, returning whether anything was set
  pub fn clear_timeout(&mut self) -> bool {
    let was_set = self.queue_timeout_active_entry_id.is_some()
      || self.queue_timeout_deadline_at.is_some()
      || self.queue_timeout_extended_count != 0
      || self.queue_timeout_reminded_at.is_some();
    self.queue_timeout_active_entry_id = None;
    self.queue_timeout_deadline_at = None;
    self.queue_timeout_extended_count = 0;
    self.queue_timeout_reminded_at = None;
    was_set
  }

  /// 构造带实时推导状态和排队数量的快照
  /// Build a snapshot with the freshly resolved status and queue count
  pub fn snapshot(
    &self,
    queue_count: usize,
    now: DateTime<Utc>,
    offline_threshold: Duration,
  ) -> DeviceSnapshot {
    DeviceSnapshot {
      id: self.id,
      device_code: self.device_code.clone(),
      name: self.name.clone(),
      model: self.model.clone(),
      location: self.location.clone(),
      status: self.resolve_status(now, offline_threshold),
      last_heartbeat_at: self.last_heartbeat_at,
      manual_status: self.manual_status_active(now),
      manual_status_expires_at: self.manual_status_expires_at,
      task_id: self.task_id.clone(),
      task_name: self.task_name.clone(),
      task_progress: self.task_progress,
      task_started_at: self.task_started_at,
      metrics: self.metrics.clone(),
      queue_timeout_active_entry_id: self.queue_timeout_active_entry_id,
      queue_timeout_deadline_at: self.queue_timeout_deadline_at,
      queue_timeout_extended_count: self.queue_timeout_extended_count,
      queue_count,
      created_at: self.created_at,
    }
  }
}

/// 注册设备的请求
/// Device registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDevice {
  pub device_code: String,
  pub name: String,
  #[serde(default)]
  pub model: Option<String>,
  #[serde(default)]
  pub location: Option<String>,
}

/// 更新设备元数据的请求，缺省字段保持不变
/// Device metadata update request; omitted fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceUpdate {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub model: Option<String>,
  #[serde(default)]
  pub location: Option<String>,
}

/// 设置或清除人工覆盖状态的请求
/// Request to set or clear the manual override
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualOverride {
  /// `None` 表示清除覆盖
  /// `None` clears the override
  #[serde(default)]
  pub status: Option<ManualStatus>,
  #[serde(default)]
  pub expires_at: Option<DateTime<Utc>>,
}

/// 写入存储的新设备行
/// New device row written to the store
#[derive(Debug, Clone)]
pub struct NewDevice {
  pub device_code: String,
  pub name: String,
  pub model: Option<String>,
  pub location: Option<String>,
  pub created_at: DateTime<Utc>,
}

/// 设备心跳上报
/// Device heartbeat report
///
/// `status_hint` 仅供参考，状态由状态机推导
/// `status_hint` is advisory only; status is derived by the state machine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatReport {
  #[serde(default)]
  pub status_hint: Option<String>,
  #[serde(default)]
  pub task_id: Option<String>,
  #[serde(default)]
  pub task_name: Option<String>,
  #[serde(default)]
  pub task_progress: i32,
  #[serde(default)]
  pub metrics: Option<serde_json::Value>,
}

/// 面向订阅者的设备快照，状态为实时推导值
/// Device snapshot for subscribers; the status is freshly resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
  pub id: i64,
  pub device_code: String,
  pub name: String,
  pub model: Option<String>,
  pub location: Option<String>,
  pub status: DeviceStatus,
  pub last_heartbeat_at: Option<DateTime<Utc>>,
  pub manual_status: Option<ManualStatus>,
  pub manual_status_expires_at: Option<DateTime<Utc>>,
  pub task_id: Option<String>,
  pub task_name: Option<String>,
  pub task_progress: i32,
  pub task_started_at: Option<DateTime<Utc>>,
  pub metrics: Option<serde_json::Value>,
  pub queue_timeout_active_entry_id: Option<i64>,
  pub queue_timeout_deadline_at: Option<DateTime<Utc>>,
  pub queue_timeout_extended_count: i32,
  pub queue_count: usize,
  pub created_at: DateTime<Utc>,
}
