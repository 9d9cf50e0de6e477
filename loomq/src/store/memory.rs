//! 内存存储实现
//! In-memory storage implementation
//!
//! 用于测试和单进程部署，数据在进程退出后丢失
//! Meant for tests and single-process deployments; data is lost on exit

use crate::device::{Device, DeviceStatus, NewDevice};
use crate::error::{Error, Result};
use crate::queue::{NewQueueEntry, NewQueueLog, QueueEntry, QueueLog};
use crate::store::Store;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
  devices: BTreeMap<i64, Device>,
  entries: BTreeMap<i64, QueueEntry>,
  logs: Vec<QueueLog>,
  next_device_id: i64,
  next_entry_id: i64,
  next_log_id: i64,
}

/// 内存存储
/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  inner: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
  /// 创建空的内存存储
  /// Create an empty in-memory store
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn insert_device(&self, device: NewDevice) -> Result<Device> {
    let mut state = self.inner.write().await;
    if state
      .devices
      .values()
      .any(|existing| existing.device_code == device.device_code)
    {
      return Err(Error::device_exists(device.device_code));
    }
    state.next_device_id += 1;
    let id = state.next_device_id;
    let row = Device {
      id,
      device_code: device.device_code,
      name: device.name,
      model: device.model,
      location: device.location,
      // 尚无心跳，新设备天然离线
      // No heartbeat yet, so a fresh device is naturally offline
      status: DeviceStatus::Offline,
      last_heartbeat_at: None,
      manual_status: None,
      manual_status_expires_at: None,
      task_id: None,
      task_name: None,
      task_progress: 0,
      task_started_at: None,
      metrics: None,
      queue_timeout_active_entry_id: None,
      queue_timeout_deadline_at: None,
      queue_timeout_extended_count: 0,
      queue_timeout_reminded_at: None,
      created_at: device.created_at,
    };
    state.devices.insert(id, row.clone());
    Ok(row)
  }

  async fn device(&self, device_id: i64) -> Result<Option<Device>> {
    let state = self.inner.read().await;
    Ok(state.devices.get(&device_id).cloned())
  }

  async fn device_by_code(&self, code: &str) -> Result<Option<Device>> {
    let state = self.inner.read().await;
    Ok(
      state
        .devices
        .values()
        .find(|device| device.device_code == code)
        .cloned(),
    )
  }

  async fn devices(&self) -> Result<Vec<Device>> {
    let state = self.inner.read().await;
    Ok(state.devices.values().cloned().collect())
  }

  async fn save_device(&self, device: &Device) -> Result<()> {
    let mut state = self.inner.write().await;
    if !state.devices.contains_key(&device.id) {
      return Err(Error::device_not_found(device.id));
    }
    state.devices.insert(device.id, device.clone());
    Ok(())
  }

  async fn delete_device(&self, device_id: i64) -> Result<bool> {
    let mut state = self.inner.write().await;
    let existed = state.devices.remove(&device_id).is_some();
    if existed {
      state.entries.retain(|_, entry| entry.device_id != device_id);
    }
    Ok(existed)
  }

  async fn insert_entries(&self, entries: Vec<NewQueueEntry>) -> Result<Vec<QueueEntry>> {
    let mut state = self.inner.write().await;
    let mut created = Vec::with_capacity(entries.len());
    for entry in entries {
      state.next_entry_id += 1;
      let id = state.next_entry_id;
      let row = QueueEntry {
        id,
        device_id: entry.device_id,
        inspector_name: entry.inspector_name,
        created_by_id: entry.created_by_id,
        position: entry.position,
        version: 0,
        submitted_at: entry.submitted_at,
      };
      state.entries.insert(id, row.clone());
      created.push(row);
    }
    Ok(created)
  }

  async fn entry(&self, entry_id: i64) -> Result<Option<QueueEntry>> {
    let state = self.inner.read().await;
    Ok(state.entries.get(&entry_id).cloned())
  }

  async fn entries_for_device(&self, device_id: i64) -> Result<Vec<QueueEntry>> {
    let state = self.inner.read().await;
    let mut entries: Vec<QueueEntry> = state
      .entries
      .values()
      .filter(|entry| entry.device_id == device_id)
      .cloned()
      .collect();
    entries.sort_by_key(|entry| entry.position);
    Ok(entries)
  }

  async fn save_entries(&self, entries: &[QueueEntry]) -> Result<()> {
    let mut state = self.inner.write().await;
    for entry in entries {
      if !state.entries.contains_key(&entry.id) {
        return Err(Error::EntryNotFound { entry_id: entry.id });
      }
    }
    for entry in entries {
      state.entries.insert(entry.id, entry.clone());
    }
    Ok(())
  }

  async fn remove_entry(&self, entry_id: i64) -> Result<bool> {
    let mut state = self.inner.write().await;
    Ok(state.entries.remove(&entry_id).is_some())
  }

  async fn queue_count(&self, device_id: i64) -> Result<usize> {
    let state = self.inner.read().await;
    Ok(
      state
        .entries
        .values()
        .filter(|entry| entry.device_id == device_id)
        .count(),
    )
  }

  async fn append_log(&self, log: NewQueueLog) -> Result<QueueLog> {
    let mut state = self.inner.write().await;
    state.next_log_id += 1;
    let row = QueueLog {
      id: state.next_log_id,
      device_id: log.device_id,
      old_position: log.old_position,
      new_position: log.new_position,
      change_type: log.change_type,
      changed_by: log.changed_by,
      changed_by_id: log.changed_by_id,
      change_time: log.change_time,
      remark: log.remark,
    };
    state.logs.push(row.clone());
    Ok(row)
  }

  async fn logs_for_day(
    &self,
    device_id: i64,
    day: NaiveDate,
    limit: usize,
  ) -> Result<Vec<QueueLog>> {
    let state = self.inner.read().await;
    let mut logs: Vec<QueueLog> = state
      .logs
      .iter()
      .filter(|log| log.device_id == device_id && log.change_time.date_naive() == day)
      .cloned()
      .collect();
    logs.sort_by(|a, b| b.change_time.cmp(&a.change_time).then(b.id.cmp(&a.id)));
    logs.truncate(limit);
    Ok(logs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::queue::ChangeType;
  use chrono::{Duration, Utc};

  fn new_device(code: &str) -> NewDevice {
    NewDevice {
      device_code: code.to_string(),
      name: format!("Loom {code}"),
      model: None,
      location: None,
      created_at: Utc::now(),
    }
  }

  #[tokio::test]
  async fn test_insert_device_rejects_duplicate_code() {
    let store = MemoryStore::new();
    store.insert_device(new_device("LOOM-A1")).await.unwrap();
    let err = store.insert_device(new_device("LOOM-A1")).await.unwrap_err();
    assert!(matches!(err, Error::DeviceExists { .. }));
  }

  #[tokio::test]
  async fn test_delete_device_cascades_entries() {
    let store = MemoryStore::new();
    let a = store.insert_device(new_device("LOOM-A1")).await.unwrap();
    let b = store.insert_device(new_device("LOOM-B2")).await.unwrap();
    let now = Utc::now();
    store
      .insert_entries(vec![
        NewQueueEntry {
          device_id: a.id,
          inspector_name: "wang".to_string(),
          created_by_id: "u-1".to_string(),
          position: 1,
          submitted_at: now,
        },
        NewQueueEntry {
          device_id: b.id,
          inspector_name: "li".to_string(),
          created_by_id: "u-2".to_string(),
          position: 1,
          submitted_at: now,
        },
      ])
      .await
      .unwrap();

    assert!(store.delete_device(a.id).await.unwrap());
    assert_eq!(store.queue_count(a.id).await.unwrap(), 0);
    // 其他设备的条目保持不变
    // Entries of other devices stay untouched
    assert_eq!(store.queue_count(b.id).await.unwrap(), 1);
    assert!(!store.delete_device(a.id).await.unwrap());
  }

  #[tokio::test]
  async fn test_logs_for_day_filters_and_orders() {
    let store = MemoryStore::new();
    let device = store.insert_device(new_device("LOOM-A1")).await.unwrap();
    let now = Utc::now();
    for (offset, change_type) in [
      (Duration::days(-1), ChangeType::Join),
      (Duration::seconds(-5), ChangeType::Join),
      (Duration::zero(), ChangeType::Leave),
    ] {
      store
        .append_log(NewQueueLog {
          device_id: device.id,
          old_position: None,
          new_position: 1,
          change_type,
          changed_by: "wang".to_string(),
          changed_by_id: "u-1".to_string(),
          change_time: now + offset,
          remark: None,
        })
        .await
        .unwrap();
    }

    let logs = store
      .logs_for_day(device.id, now.date_naive(), 50)
      .await
      .unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].change_type, ChangeType::Leave);
    assert_eq!(logs[1].change_type, ChangeType::Join);
  }
}
