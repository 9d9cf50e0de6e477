//! 队列模块
//! Queue module
//!
//! 定义队列条目、变更日志以及位置哨兵值
//! Defines queue entries, the change log and the position sentinel values

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 系统自动变更在日志中使用的执行者标识
/// Actor recorded for system-initiated changes
pub const SYSTEM_ACTOR: &str = "system";

/// 日志哨兵：条目已完成
/// Log sentinel: entry completed
pub const POSITION_COMPLETED: i32 = 0;

/// 日志哨兵:条目主动离开
/// Log sentinel: entry left voluntarily
pub const POSITION_LEFT: i32 = -1;

/// 单设备单日返回的日志条数上限
/// Per-device cap on change log rows returned for one day
pub const DAILY_LOG_LIMIT: usize = 50;

/// 队列变更类型
/// Queue change type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
  /// 人工调整位置
  /// Manual reposition
  ManualMove,
  /// 加入队列
  /// Joined the queue
  Join,
  /// 主动离开
  /// Left voluntarily
  Leave,
  /// 队首完成
  /// Head completed
  Complete,
  /// 超时后系统交换位置
  /// System swap after a timeout
  TimeoutShift,
  /// 延长超时窗口
  /// Timeout window extended
  TimeoutExtend,
}

impl ChangeType {
  /// 转换为字符串表示
  /// Convert to string representation
  pub fn as_str(&self) -> &'static str {
    match self {
      ChangeType::ManualMove => "manual_move",
      ChangeType::Join => "join",
      ChangeType::Leave => "leave",
      ChangeType::Complete => "complete",
      ChangeType::TimeoutShift => "timeout_shift",
      ChangeType::TimeoutExtend => "timeout_extend",
    }
  }
}

impl fmt::Display for ChangeType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ChangeType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "manual_move" => Ok(ChangeType::ManualMove),
      "join" => Ok(ChangeType::Join),
      "leave" => Ok(ChangeType::Leave),
      "complete" => Ok(ChangeType::Complete),
      "timeout_shift" => Ok(ChangeType::TimeoutShift),
      "timeout_extend" => Ok(ChangeType::TimeoutExtend),
      _ => Err(Error::store(format!("Unknown change type: {s}"))),
    }
  }
}

/// 队列条目，同一设备的位置始终为连续的 1..N
/// Queue entry; positions within one device are always contiguous 1..N
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
  pub id: i64,
  pub device_id: i64,
  pub inspector_name: String,
  pub created_by_id: String,
  pub position: i32,
  /// 每次位置变化递增，用于乐观并发控制
  /// Bumped on every position change, used for optimistic concurrency
  pub version: i64,
  pub submitted_at: DateTime<Utc>,
}

/// 写入存储的新队列条目
/// New queue entry written to the store
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
  pub device_id: i64,
  pub inspector_name: String,
  pub created_by_id: String,
  pub position: i32,
  pub submitted_at: DateTime<Utc>,
}

/// 队列变更日志行
/// Queue change log row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueLog {
  pub id: i64,
  pub device_id: i64,
  /// 加入时为 `None`
  /// `None` for joins
  pub old_position: Option<i32>,
  /// 正常为位置，0 表示完成，-1 表示离开
  /// A position, or 0 for complete and -1 for leave
  pub new_position: i32,
  pub change_type: ChangeType,
  pub changed_by: String,
  pub changed_by_id: String,
  pub change_time: DateTime<Utc>,
  pub remark: Option<String>,
}

/// 写入存储的新日志行
/// New change log row written to the store
#[derive(Debug, Clone)]
pub struct NewQueueLog {
  pub device_id: i64,
  pub old_position: Option<i32>,
  pub new_position: i32,
  pub change_type: ChangeType,
  pub changed_by: String,
  pub changed_by_id: String,
  pub change_time: DateTime<Utc>,
  pub remark: Option<String>,
}
