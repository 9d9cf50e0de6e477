//! 队列超时看守
//! Queue timeout watchdog
//!
//! 周期评估每台设备:空闲且排队不少于两人时为队首布防超时窗口,
//! 截止前发送一次提醒,到期后把前两位交换并重新布防
//! Periodically evaluates every device: arms a timeout window for the head
//! when the device is idle with at least two waiting, sends one reminder
//! before the deadline, and swaps the first two slots on expiry before
//! re-arming

use crate::clock::{to_chrono, Clock};
use crate::components::ComponentLifecycle;
use crate::config::EngineConfig;
use crate::device::{Device, DeviceStatus};
use crate::error::{Error, Result};
use crate::events::{Event, EventHub, QueueAction};
use crate::locks::DeviceLocks;
use crate::queue::{ChangeType, NewQueueLog, QueueEntry, SYSTEM_ACTOR};
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 超时评估器,持有一次评估所需的全部依赖
/// Timeout evaluator holding everything one evaluation pass needs
///
/// 看守周期调用它;协调器在设备刚转入空闲时也会立即调用,
/// 避免等待下一个周期
/// The watchdog calls it periodically; the coordinator also calls it right
/// after a device turns idle instead of waiting for the next tick
pub struct TimeoutEvaluator {
  store: Arc<dyn Store>,
  locks: Arc<DeviceLocks>,
  hub: EventHub,
  clock: Arc<dyn Clock>,
  config: EngineConfig,
}

impl TimeoutEvaluator {
  /// 创建评估器
  /// Create an evaluator
  pub fn new(
    store: Arc<dyn Store>,
    locks: Arc<DeviceLocks>,
    hub: EventHub,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
  ) -> Self {
    TimeoutEvaluator {
      store,
      locks,
      hub,
      clock,
      config,
    }
  }

  /// 评估全部设备,单台失败只告警不中断
  /// Evaluate every device; a failing device is logged and skipped
  pub async fn evaluate_all(&self) {
    let devices = match self.store.devices().await {
      Ok(devices) => devices,
      Err(e) => {
        warn!("Timeout watchdog failed to list devices: {e}");
        return;
      }
    };
    for device in devices {
      if let Err(e) = self.evaluate_device(device.id).await {
        warn!("Timeout watchdog pass failed for device {}: {e}", device.id);
      }
    }
  }

  /// 评估单台设备的超时状态
  /// Evaluate the timeout state of one device
  pub async fn evaluate_device(&self, device_id: i64) -> Result<()> {
    let _guard = self.locks.acquire(device_id).await?;
    let Some(mut device) = self.store.device(device_id).await? else {
      // 设备在本轮评估中被删除
      // The device was deleted mid-pass
      return Ok(());
    };
    let entries = self.store.entries_for_device(device_id).await?;
    let now = self.clock.now();

    let status = device.resolve_status(now, self.config.offline_threshold);
    let eligible = status == DeviceStatus::Idle && entries.len() >= 2;
    let Some(head) = entries.first().filter(|_| eligible).cloned() else {
      if device.clear_timeout() {
        self.store.save_device(&device).await?;
        self.publish_timeout_state(&device);
        debug!("Timeout window cleared on device {device_id}");
      }
      return Ok(());
    };

    // 队首换人或尚未布防时重新布防
    // Arm anew when the head changed or no window is armed yet
    if device.queue_timeout_active_entry_id != Some(head.id)
      || device.queue_timeout_deadline_at.is_none()
    {
      device.queue_timeout_active_entry_id = Some(head.id);
      device.queue_timeout_deadline_at = Some(now + to_chrono(self.config.timeout_window));
      device.queue_timeout_extended_count = 0;
      device.queue_timeout_reminded_at = None;
      self.store.save_device(&device).await?;
      self.publish_timeout_state(&device);
      debug!("Timeout window armed for entry {} on device {device_id}", head.id);
      return Ok(());
    }

    let Some(deadline) = device.queue_timeout_deadline_at else {
      return Ok(());
    };

    if now >= deadline {
      return self.shift_expired(&mut device, entries, now).await;
    }

    if device.queue_timeout_reminded_at.is_none()
      && now >= deadline - to_chrono(self.config.reminder_lead)
    {
      device.queue_timeout_reminded_at = Some(now);
      self.store.save_device(&device).await?;
      self.hub.publish(Event::QueueTimeoutReminder {
        device_id,
        device_name: device.name.clone(),
        entry_id: head.id,
        inspector_name: head.inspector_name.clone(),
        active_created_by_id: head.created_by_id.clone(),
        next_created_by_id: entries.get(1).map(|next| next.created_by_id.clone()),
        deadline_at: deadline,
      });
      self.publish_timeout_state(&device);
      debug!("Timeout reminder sent for entry {} on device {device_id}", head.id);
    }
    Ok(())
  }

  /// 截止已过:交换前两位,记录 timeout_shift 日志并为新队首重新布防
  /// Deadline passed: swap the first two slots, log the timeout_shift and
  /// re-arm for the new head
  async fn shift_expired(
    &self,
    device: &mut Device,
    entries: Vec<QueueEntry>,
    now: DateTime<Utc>,
  ) -> Result<()> {
    let device_id = device.id;
    let (Some(head), Some(second)) = (entries.first(), entries.get(1)) else {
      return Ok(());
    };

    let mut timed_out = head.clone();
    let mut promoted = second.clone();
    timed_out.position = 2;
    timed_out.version += 1;
    promoted.position = 1;
    promoted.version += 1;
    self
      .store
      .save_entries(&[timed_out.clone(), promoted.clone()])
      .await?;

    self
      .store
      .append_log(NewQueueLog {
        device_id,
        old_position: Some(1),
        new_position: 2,
        change_type: ChangeType::TimeoutShift,
        changed_by: SYSTEM_ACTOR.to_string(),
        changed_by_id: SYSTEM_ACTOR.to_string(),
        change_time: now,
        remark: Some("queue slot timed out".to_string()),
      })
      .await?;

    device.queue_timeout_active_entry_id = Some(promoted.id);
    device.queue_timeout_deadline_at = Some(now + to_chrono(self.config.timeout_window));
    device.queue_timeout_extended_count = 0;
    device.queue_timeout_reminded_at = None;
    self.store.save_device(device).await?;

    self.hub.publish(Event::QueueUpdate {
      device_id,
      action: QueueAction::TimeoutShift,
      entry_id: timed_out.id,
      queue_count: entries.len(),
    });
    self.hub.publish(Event::QueueTimeoutShift {
      device_id,
      device_name: device.name.clone(),
      timed_out_entry_id: timed_out.id,
      timed_out_inspector: timed_out.inspector_name.clone(),
      timed_out_created_by_id: timed_out.created_by_id.clone(),
      new_active_entry_id: promoted.id,
      new_active_inspector: promoted.inspector_name.clone(),
      new_active_created_by_id: promoted.created_by_id.clone(),
    });
    self.publish_timeout_state(device);

    info!(
      "Entry {} timed out on device {device_id}, entry {} promoted to head",
      timed_out.id, promoted.id
    );
    Ok(())
  }

  /// 延长当前截止时间
  /// Extend the current deadline
  ///
  /// 同一窗口最多延长 `max_extensions` 次,超出返回 `ExtendLimitExceeded`;
  /// 延长会重置提醒标记
  /// A window may be extended at most `max_extensions` times, past that
  /// `ExtendLimitExceeded` is returned; extending resets the reminder flag
  pub async fn extend(
    &self,
    device_id: i64,
    changed_by: &str,
    changed_by_id: &str,
  ) -> Result<(DateTime<Utc>, i32)> {
    let _guard = self.locks.acquire(device_id).await?;
    let Some(mut device) = self.store.device(device_id).await? else {
      return Err(Error::device_not_found(device_id));
    };
    let Some(deadline) = device.queue_timeout_deadline_at else {
      return Err(Error::NoActiveDeadline { device_id });
    };
    if device.queue_timeout_extended_count >= self.config.max_extensions {
      return Err(Error::ExtendLimitExceeded {
        device_id,
        limit: self.config.max_extensions,
      });
    }

    let new_deadline = deadline + to_chrono(self.config.extension_increment);
    device.queue_timeout_deadline_at = Some(new_deadline);
    device.queue_timeout_extended_count += 1;
    device.queue_timeout_reminded_at = None;
    self.store.save_device(&device).await?;

    self
      .store
      .append_log(NewQueueLog {
        device_id,
        old_position: Some(1),
        new_position: 1,
        change_type: ChangeType::TimeoutExtend,
        changed_by: changed_by.to_string(),
        changed_by_id: changed_by_id.to_string(),
        change_time: self.clock.now(),
        remark: Some(format!(
          "deadline extended ({}/{})",
          device.queue_timeout_extended_count, self.config.max_extensions
        )),
      })
      .await?;
    self.publish_timeout_state(&device);

    info!(
      "Deadline on device {device_id} extended to {new_deadline} ({}/{})",
      device.queue_timeout_extended_count, self.config.max_extensions
    );
    Ok((new_deadline, device.queue_timeout_extended_count))
  }

  fn publish_timeout_state(&self, device: &Device) {
    self.hub.publish(Event::QueueTimeoutUpdate {
      device_id: device.id,
      active_entry_id: device.queue_timeout_active_entry_id,
      deadline_at: device.queue_timeout_deadline_at,
      extended_count: device.queue_timeout_extended_count,
      reminded_at: device.queue_timeout_reminded_at,
    });
  }
}

/// 超时看守组件,按固定间隔驱动评估器
/// Timeout watchdog component driving the evaluator at a fixed interval
pub struct TimeoutWatchdog {
  evaluator: Arc<TimeoutEvaluator>,
  interval: Duration,
  done: Arc<AtomicBool>,
}

impl TimeoutWatchdog {
  /// 创建看守
  /// Create the watchdog
  pub fn new(evaluator: Arc<TimeoutEvaluator>, interval: Duration) -> Self {
    TimeoutWatchdog {
      evaluator,
      interval,
      done: Arc::new(AtomicBool::new(false)),
    }
  }
}

impl ComponentLifecycle for TimeoutWatchdog {
  fn start(self: Arc<Self>) -> JoinHandle<()> {
    let watchdog = self.clone();
    tokio::spawn(async move {
      info!("Timeout watchdog started");
      let mut interval = tokio::time::interval(watchdog.interval);
      loop {
        interval.tick().await;
        if watchdog.done.load(Ordering::SeqCst) {
          info!("Timeout watchdog stopped");
          break;
        }
        watchdog.evaluator.evaluate_all().await;
      }
    })
  }

  fn shutdown(&self) {
    self.done.store(true, Ordering::SeqCst);
  }

  fn is_done(&self) -> bool {
    self.done.load(Ordering::SeqCst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::store::MemoryStore;

  #[tokio::test]
  async fn test_watchdog_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let config = EngineConfig::default();
    let evaluator = Arc::new(TimeoutEvaluator::new(
      store,
      Arc::new(DeviceLocks::new(config.lock_timeout)),
      EventHub::new(config.event_buffer),
      clock,
      config,
    ));
    let watchdog = Arc::new(TimeoutWatchdog::new(
      evaluator,
      Duration::from_millis(5),
    ));

    let handle = watchdog.clone().start();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!watchdog.is_done());

    watchdog.shutdown();
    handle.await.unwrap();
    assert!(watchdog.is_done());
  }
}
