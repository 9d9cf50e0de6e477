//! 队列管理器
//! Queue manager
//!
//! 在设备锁内执行全部队列变更,维护两条不变量:
//! 同一设备的位置始终为连续的 1..N,条目版本在每次移动时递增
//! Performs every queue mutation under the device lock, upholding two
//! invariants: positions of one device are always contiguous 1..N, and entry
//! versions are bumped on every move

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::events::{Event, EventHub, QueueAction};
use crate::locks::DeviceLocks;
use crate::queue::{
  ChangeType, NewQueueEntry, NewQueueLog, QueueEntry, QueueLog, DAILY_LOG_LIMIT, POSITION_COMPLETED,
  POSITION_LEFT,
};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

fn default_copies() -> u32 {
  1
}

/// 加入队列的请求
/// Request to join a queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
  pub device_id: i64,
  pub inspector_name: String,
  pub created_by_id: String,
  /// 一次占用的槽位数量,缺省为 1
  /// Number of slots to take at once, defaulting to 1
  #[serde(default = "default_copies")]
  pub copies: u32,
}

/// 调整位置的请求
/// Request to reposition an entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositionRequest {
  pub new_position: i32,
  /// 调用方最近读到的条目版本
  /// The entry version the caller last read
  pub version: i64,
  pub changed_by: String,
  pub changed_by_id: String,
}

/// 队列视图:全部条目加上当天的变更日志
/// Queue view: all entries plus today's change log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueView {
  pub queue: Vec<QueueEntry>,
  pub logs: Vec<QueueLog>,
}

/// 队列管理器
/// Queue manager
#[derive(Clone)]
pub struct QueueManager {
  store: Arc<dyn Store>,
  locks: Arc<DeviceLocks>,
  hub: EventHub,
  clock: Arc<dyn Clock>,
}

impl QueueManager {
  /// 创建队列管理器
  /// Create a queue manager
  pub fn new(
    store: Arc<dyn Store>,
    locks: Arc<DeviceLocks>,
    hub: EventHub,
    clock: Arc<dyn Clock>,
  ) -> Self {
    QueueManager {
      store,
      locks,
      hub,
      clock,
    }
  }

  /// 在队尾追加一或多个条目
  /// Append one or more entries at the tail of the queue
  ///
  /// 多份条目位置连续,各自独立计日志;只发布一条 join 事件
  /// Multiple copies get consecutive positions and one log row each; a single
  /// join event is published
  pub async fn join(&self, req: JoinRequest) -> Result<Vec<QueueEntry>> {
    if req.copies < 1 {
      return Err(Error::InvalidCopies { copies: req.copies });
    }
    let _guard = self.locks.acquire(req.device_id).await?;
    if self.store.device(req.device_id).await?.is_none() {
      return Err(Error::device_not_found(req.device_id));
    }

    let base = self.store.queue_count(req.device_id).await?;
    let now = self.clock.now();
    let rows: Vec<NewQueueEntry> = (0..req.copies)
      .map(|offset| NewQueueEntry {
        device_id: req.device_id,
        inspector_name: req.inspector_name.clone(),
        created_by_id: req.created_by_id.clone(),
        position: base as i32 + offset as i32 + 1,
        submitted_at: now,
      })
      .collect();
    let created = self.store.insert_entries(rows).await?;

    for entry in &created {
      self
        .store
        .append_log(NewQueueLog {
          device_id: req.device_id,
          old_position: None,
          new_position: entry.position,
          change_type: ChangeType::Join,
          changed_by: entry.inspector_name.clone(),
          changed_by_id: entry.created_by_id.clone(),
          change_time: now,
          remark: None,
        })
        .await?;
    }

    debug!(
      "{} joined device {} queue with {} slot(s)",
      req.inspector_name, req.device_id, req.copies
    );
    if let Some(first) = created.first() {
      self.hub.publish(Event::QueueUpdate {
        device_id: req.device_id,
        action: QueueAction::Join,
        entry_id: first.id,
        queue_count: base + created.len(),
      });
    }
    Ok(created)
  }

  /// 把条目移动到新位置
  /// Move an entry to a new position
  ///
  /// 版本不符返回 `VersionConflict` 且不做任何修改;小于 1 的目标位置被拒绝,
  /// 超过队尾的目标位置收敛到队尾;两者之间的条目整体平移一位
  /// A stale version yields `VersionConflict` with nothing modified; targets
  /// below 1 are rejected and targets past the tail clamp to the tail; entries
  /// between the two slots shift by one
  pub async fn reposition(&self, entry_id: i64, req: RepositionRequest) -> Result<QueueEntry> {
    let Some(entry) = self.store.entry(entry_id).await? else {
      return Err(Error::EntryNotFound { entry_id });
    };
    let device_id = entry.device_id;
    let _guard = self.locks.acquire(device_id).await?;

    // 锁内重读,锁外读到的条目可能已经过期
    // Reload under the lock; the entry read outside it may be stale
    let mut entries = self.store.entries_for_device(device_id).await?;
    let Some(current) = entries.iter().find(|candidate| candidate.id == entry_id) else {
      return Err(Error::EntryNotFound { entry_id });
    };
    if current.version != req.version {
      return Err(Error::VersionConflict {
        entry_id,
        expected: req.version,
        actual: current.version,
      });
    }

    let len = entries.len();
    if req.new_position < 1 {
      return Err(Error::InvalidRange {
        position: req.new_position,
        len,
      });
    }
    let target = req.new_position.min(len as i32);
    let old_position = current.position;
    if target == old_position {
      return Ok(current.clone());
    }

    let mut moved: Option<QueueEntry> = None;
    let mut changed: Vec<QueueEntry> = Vec::new();
    for entry in &mut entries {
      if entry.id == entry_id {
        entry.position = target;
        entry.version += 1;
        moved = Some(entry.clone());
        changed.push(entry.clone());
      } else if old_position < target && entry.position > old_position && entry.position <= target {
        entry.position -= 1;
        entry.version += 1;
        changed.push(entry.clone());
      } else if target < old_position && entry.position >= target && entry.position < old_position {
        entry.position += 1;
        entry.version += 1;
        changed.push(entry.clone());
      }
    }
    let moved = moved.ok_or(Error::EntryNotFound { entry_id })?;
    self.store.save_entries(&changed).await?;

    let now = self.clock.now();
    self
      .store
      .append_log(NewQueueLog {
        device_id,
        old_position: Some(old_position),
        new_position: target,
        change_type: ChangeType::ManualMove,
        changed_by: req.changed_by,
        changed_by_id: req.changed_by_id,
        change_time: now,
        remark: None,
      })
      .await?;
    self.clear_stale_deadline(device_id).await?;

    debug!(
      "entry {} on device {} moved from {} to {}",
      entry_id, device_id, old_position, target
    );
    self.hub.publish(Event::QueueUpdate {
      device_id,
      action: QueueAction::PositionChange,
      entry_id,
      queue_count: len,
    });
    Ok(moved)
  }

  /// 条目主动离开队列,后续条目前移一位
  /// Remove an entry voluntarily; later entries shift forward by one
  pub async fn leave(&self, entry_id: i64, changed_by_id: &str) -> Result<()> {
    let Some(entry) = self.store.entry(entry_id).await? else {
      return Err(Error::EntryNotFound { entry_id });
    };
    let device_id = entry.device_id;
    let _guard = self.locks.acquire(device_id).await?;

    let mut entries = self.store.entries_for_device(device_id).await?;
    let Some(index) = entries.iter().position(|candidate| candidate.id == entry_id) else {
      return Err(Error::EntryNotFound { entry_id });
    };
    let removed = entries.remove(index);
    if !self.store.remove_entry(entry_id).await? {
      return Err(Error::EntryNotFound { entry_id });
    }

    let mut changed: Vec<QueueEntry> = Vec::new();
    for entry in &mut entries {
      if entry.position > removed.position {
        entry.position -= 1;
        entry.version += 1;
        changed.push(entry.clone());
      }
    }
    self.store.save_entries(&changed).await?;

    self
      .store
      .append_log(NewQueueLog {
        device_id,
        old_position: Some(removed.position),
        new_position: POSITION_LEFT,
        change_type: ChangeType::Leave,
        changed_by: removed.inspector_name.clone(),
        changed_by_id: changed_by_id.to_string(),
        change_time: self.clock.now(),
        remark: None,
      })
      .await?;
    self.clear_stale_deadline(device_id).await?;

    debug!(
      "entry {} left device {} queue from position {}",
      entry_id, device_id, removed.position
    );
    self.hub.publish(Event::QueueUpdate {
      device_id,
      action: QueueAction::Leave,
      entry_id,
      queue_count: entries.len(),
    });
    Ok(())
  }

  /// 队首完成并出队,空队列静默返回
  /// Complete and dequeue the head, silently when the queue is empty
  pub async fn complete(&self, device_id: i64) -> Result<Option<QueueEntry>> {
    let _guard = self.locks.acquire(device_id).await?;
    if self.store.device(device_id).await?.is_none() {
      return Err(Error::device_not_found(device_id));
    }

    let mut entries = self.store.entries_for_device(device_id).await?;
    if entries.is_empty() {
      return Ok(None);
    }
    let head = entries.remove(0);
    if !self.store.remove_entry(head.id).await? {
      return Err(Error::EntryNotFound { entry_id: head.id });
    }

    let mut changed: Vec<QueueEntry> = Vec::new();
    for entry in &mut entries {
      entry.position -= 1;
      entry.version += 1;
      changed.push(entry.clone());
    }
    self.store.save_entries(&changed).await?;

    self
      .store
      .append_log(NewQueueLog {
        device_id,
        old_position: Some(head.position),
        new_position: POSITION_COMPLETED,
        change_type: ChangeType::Complete,
        changed_by: head.inspector_name.clone(),
        changed_by_id: head.created_by_id.clone(),
        change_time: self.clock.now(),
        remark: None,
      })
      .await?;
    self.clear_stale_deadline(device_id).await?;

    debug!("entry {} completed on device {}", head.id, device_id);
    self.hub.publish(Event::QueueUpdate {
      device_id,
      action: QueueAction::Complete,
      entry_id: head.id,
      queue_count: entries.len(),
    });
    Ok(Some(head))
  }

  /// 队列视图:条目按位置升序,外加当天日志
  /// Queue view: entries in position order plus today's log
  pub async fn queue(&self, device_id: i64) -> Result<QueueView> {
    if self.store.device(device_id).await?.is_none() {
      return Err(Error::device_not_found(device_id));
    }
    let queue = self.store.entries_for_device(device_id).await?;
    let logs = self
      .store
      .logs_for_day(device_id, self.clock.now().date_naive(), DAILY_LOG_LIMIT)
      .await?;
    Ok(QueueView { queue, logs })
  }

  /// 当前排队数量
  /// Current queue length
  pub async fn count(&self, device_id: i64) -> Result<usize> {
    if self.store.device(device_id).await?.is_none() {
      return Err(Error::device_not_found(device_id));
    }
    self.store.queue_count(device_id).await
  }

  /// 队首变化或队列过短时撤销超时窗口
  /// Drop the timeout window when the head changed or the queue got too short
  ///
  /// 调用方必须持有设备锁
  /// Callers must hold the device lock
  async fn clear_stale_deadline(&self, device_id: i64) -> Result<()> {
    let Some(mut device) = self.store.device(device_id).await? else {
      return Ok(());
    };
    if device.queue_timeout_active_entry_id.is_none()
      && device.queue_timeout_deadline_at.is_none()
    {
      return Ok(());
    }

    let entries = self.store.entries_for_device(device_id).await?;
    let still_valid = match (entries.first(), device.queue_timeout_active_entry_id) {
      (Some(head), Some(active)) => head.id == active && entries.len() >= 2,
      _ => false,
    };
    if still_valid {
      return Ok(());
    }

    if device.clear_timeout() {
      self.store.save_device(&device).await?;
      self.hub.publish(Event::QueueTimeoutUpdate {
        device_id,
        active_entry_id: None,
        deadline_at: None,
        extended_count: 0,
        reminded_at: None,
      });
    }
    Ok(())
  }
}
