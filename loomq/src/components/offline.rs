//! 离线监视器
//! Offline monitor
//!
//! 周期扫描全部设备,把心跳超过阈值的设备落库标记为离线并广播通知
//! Periodically sweeps all devices, persisting the offline status for those
//! whose heartbeat went past the threshold and broadcasting the change

use crate::clock::Clock;
use crate::components::ComponentLifecycle;
use crate::config::EngineConfig;
use crate::device::DeviceStatus;
use crate::error::Result;
use crate::events::{Event, EventHub};
use crate::locks::DeviceLocks;
use crate::store::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 离线监视器组件
/// Offline monitor component
pub struct OfflineMonitor {
  store: Arc<dyn Store>,
  locks: Arc<DeviceLocks>,
  hub: EventHub,
  clock: Arc<dyn Clock>,
  config: EngineConfig,
  done: Arc<AtomicBool>,
}

impl OfflineMonitor {
  /// 创建监视器
  /// Create the monitor
  pub fn new(
    store: Arc<dyn Store>,
    locks: Arc<DeviceLocks>,
    hub: EventHub,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
  ) -> Self {
    OfflineMonitor {
      store,
      locks,
      hub,
      clock,
      config,
      done: Arc::new(AtomicBool::new(false)),
    }
  }

  /// 扫描一轮,单台失败只告警不中断
  /// Run one sweep; a failing device is logged and skipped
  pub async fn sweep(&self) {
    let devices = match self.store.devices().await {
      Ok(devices) => devices,
      Err(e) => {
        warn!("Offline monitor failed to list devices: {e}");
        return;
      }
    };
    for device in devices {
      // 已落库离线的设备无需处理
      // Devices already persisted as offline need no work
      if device.status == DeviceStatus::Offline {
        continue;
      }
      if let Err(e) = self.sweep_device(device.id).await {
        warn!("Offline sweep failed for device {}: {e}", device.id);
      }
    }
  }

  async fn sweep_device(&self, device_id: i64) -> Result<()> {
    let _guard = self.locks.acquire(device_id).await?;
    let Some(mut device) = self.store.device(device_id).await? else {
      return Ok(());
    };
    let now = self.clock.now();
    if device.status == DeviceStatus::Offline
      || !device.is_stale(now, self.config.offline_threshold)
    {
      return Ok(());
    }

    let last_seen = device.last_heartbeat_at;
    device.status = DeviceStatus::Offline;
    self.store.save_device(&device).await?;

    let queue_count = self.store.queue_count(device_id).await?;
    self.hub.publish(Event::DeviceOffline {
      device_id,
      device_name: device.name.clone(),
      last_seen,
    });
    self.hub.publish(Event::DeviceStatusUpdate {
      device: device.snapshot(queue_count, now, self.config.offline_threshold),
    });
    info!("Device {} ({device_id}) marked offline", device.device_code);
    Ok(())
  }
}

impl ComponentLifecycle for OfflineMonitor {
  fn start(self: Arc<Self>) -> JoinHandle<()> {
    let monitor = self.clone();
    tokio::spawn(async move {
      info!("Offline monitor started");
      let mut interval = tokio::time::interval(monitor.config.offline_sweep_interval);
      loop {
        interval.tick().await;
        if monitor.done.load(Ordering::SeqCst) {
          info!("Offline monitor stopped");
          break;
        }
        monitor.sweep().await;
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
  use crate::device::NewDevice;
  use crate::store::MemoryStore;
  use chrono::Utc;
  use std::time::Duration;

  #[tokio::test]
  async fn test_sweep_marks_stale_device_offline() {
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let store = Arc::new(MemoryStore::new());
    let config = EngineConfig::default();
    let monitor = OfflineMonitor::new(
      store.clone(),
      Arc::new(DeviceLocks::new(config.lock_timeout)),
      EventHub::new(config.event_buffer),
      clock.clone(),
      config.clone(),
    );

    let mut device = store
      .insert_device(NewDevice {
        device_code: "LOOM-A1".to_string(),
        name: "Loom A1".to_string(),
        model: None,
        location: None,
        created_at: start,
      })
      .await
      .unwrap();
    device.status = DeviceStatus::Idle;
    device.last_heartbeat_at = Some(start);
    store.save_device(&device).await.unwrap();

    // 阈值以内不动
    // Untouched within the threshold
    monitor.sweep().await;
    let fresh = store.device(device.id).await.unwrap().unwrap();
    assert_eq!(fresh.status, DeviceStatus::Idle);

    clock.advance(config.offline_threshold + Duration::from_secs(1));
    monitor.sweep().await;
    let stale = store.device(device.id).await.unwrap().unwrap();
    assert_eq!(stale.status, DeviceStatus::Offline);
  }
}
