//! 事件模块
//! Event module
//!
//! 定义广播给订阅者的事件信封和进程内事件中心
//! Defines the event envelopes broadcast to subscribers and the in-process hub

use crate::device::DeviceSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// 设备列表变更动作
/// Device list change action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListAction {
  Create,
  Update,
  Delete,
}

/// 队列变更动作
/// Queue change action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
  Join,
  Leave,
  PositionChange,
  Complete,
  TimeoutShift,
}

/// 广播事件，按 `{"type": ..., "data": ...}` 信封序列化
/// Broadcast event, serialized as a `{"type": ..., "data": ...}` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
  /// 单台设备的最新快照
  /// Fresh snapshot of a single device
  #[serde(rename = "device_status_update")]
  DeviceStatusUpdate { device: DeviceSnapshot },

  /// 设备被注册、更新或删除
  /// A device was registered, updated or deleted
  #[serde(rename = "device_list_update")]
  DeviceListUpdate {
    action: ListAction,
    device: DeviceSnapshot,
  },

  /// 设备心跳超过离线阈值
  /// A device heartbeat went past the offline threshold
  #[serde(rename = "device_offline")]
  DeviceOffline {
    device_id: i64,
    device_name: String,
    last_seen: Option<DateTime<Utc>>,
  },

  /// 队列内容发生变化
  /// The queue contents changed
  #[serde(rename = "queue_update")]
  QueueUpdate {
    device_id: i64,
    action: QueueAction,
    entry_id: i64,
    queue_count: usize,
  },

  /// 超时窗口被设置、延长或清除
  /// The timeout window was armed, extended or cleared
  #[serde(rename = "queue_timeout_update")]
  QueueTimeoutUpdate {
    device_id: i64,
    active_entry_id: Option<i64>,
    deadline_at: Option<DateTime<Utc>>,
    extended_count: i32,
    reminded_at: Option<DateTime<Utc>>,
  },

  /// 截止时间临近的一次性提醒
  /// One-shot reminder that the deadline is near
  #[serde(rename = "queue_timeout_reminder")]
  QueueTimeoutReminder {
    device_id: i64,
    device_name: String,
    entry_id: i64,
    inspector_name: String,
    active_created_by_id: String,
    next_created_by_id: Option<String>,
    deadline_at: DateTime<Utc>,
  },

  /// 超时后前两位交换
  /// The first two slots were swapped after a timeout
  #[serde(rename = "queue_timeout_shift")]
  QueueTimeoutShift {
    device_id: i64,
    device_name: String,
    timed_out_entry_id: i64,
    timed_out_inspector: String,
    timed_out_created_by_id: String,
    new_active_entry_id: i64,
    new_active_inspector: String,
    new_active_created_by_id: String,
  },
}

impl Event {
  /// 事件关联的设备 id，用于订阅过滤
  /// Device id the event relates to, used for subscription filtering
  pub fn device_id(&self) -> i64 {
    match self {
      Event::DeviceStatusUpdate { device } => device.id,
      Event::DeviceListUpdate { device, .. } => device.id,
      Event::DeviceOffline { device_id, .. } => *device_id,
      Event::QueueUpdate { device_id, .. } => *device_id,
      Event::QueueTimeoutUpdate { device_id, .. } => *device_id,
      Event::QueueTimeoutReminder { device_id, .. } => *device_id,
      Event::QueueTimeoutShift { device_id, .. } => *device_id,
    }
  }
}

/// 进程内事件中心，基于 tokio broadcast 通道
/// In-process event hub backed by a tokio broadcast channel
///
/// 投递为尽力而为:没有订阅者时事件被丢弃,慢订阅者会丢失最旧的事件
/// Delivery is best-effort: events are dropped when nobody listens, and slow
/// subscribers lose the oldest events
#[derive(Debug, Clone)]
pub struct EventHub {
  tx: broadcast::Sender<Event>,
}

impl EventHub {
  /// 创建指定缓冲大小的事件中心
  /// Create a hub with the given buffer capacity
  pub fn new(buffer: usize) -> Self {
    let (tx, _) = broadcast::channel(buffer);
    EventHub { tx }
  }

  /// 发布事件，忽略无订阅者的情况
  /// Publish an event, ignoring the no-subscriber case
  pub fn publish(&self, event: Event) {
    let _ = self.tx.send(event);
  }

  /// 订阅事件流
  /// Subscribe to the event stream
  pub fn subscribe(&self) -> broadcast::Receiver<Event> {
    self.tx.subscribe()
  }

  /// 当前订阅者数量
  /// Current number of subscribers
  pub fn subscriber_count(&self) -> usize {
    self.tx.receiver_count()
  }
}
