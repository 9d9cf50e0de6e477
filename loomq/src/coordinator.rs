//! 协调器
//! Coordinator
//!
//! 引擎的对外入口:设备登记、心跳处理、人工状态覆盖、超时延长,
//! 以及后台组件的启动与关闭
//! The engine's front door: device registry, heartbeat handling, manual
//! status overrides, deadline extension, and background component lifecycle

use crate::clock::{Clock, SystemClock};
use crate::components::{ComponentLifecycle, OfflineMonitor, TimeoutEvaluator, TimeoutWatchdog};
use crate::config::EngineConfig;
use crate::device::{
  Device, DeviceSnapshot, DeviceStatus, DeviceUpdate, HeartbeatReport, ManualOverride, NewDevice,
  RegisterDevice,
};
use crate::error::{Error, Result};
use crate::events::{Event, EventHub, ListAction};
use crate::locks::DeviceLocks;
use crate::manager::QueueManager;
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 协调器,设备状态与队列协调引擎的入口
/// Coordinator, the entry point of the status and queue coordination engine
pub struct Coordinator {
  store: Arc<dyn Store>,
  locks: Arc<DeviceLocks>,
  hub: EventHub,
  clock: Arc<dyn Clock>,
  config: EngineConfig,
  manager: QueueManager,
  evaluator: Arc<TimeoutEvaluator>,
  components: Mutex<Vec<(Arc<dyn ComponentLifecycle + Send + Sync>, JoinHandle<()>)>>,
}

impl Coordinator {
  /// 用系统时钟创建协调器
  /// Create a coordinator on the system clock
  pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Result<Self> {
    Self::with_clock(store, config, Arc::new(SystemClock))
  }

  /// 用指定时钟创建协调器,测试用
  /// Create a coordinator on an explicit clock, for tests
  pub fn with_clock(
    store: Arc<dyn Store>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
  ) -> Result<Self> {
    config.validate()?;
    let locks = Arc::new(DeviceLocks::new(config.lock_timeout));
    let hub = EventHub::new(config.event_buffer);
    let manager = QueueManager::new(store.clone(), locks.clone(), hub.clone(), clock.clone());
    let evaluator = Arc::new(TimeoutEvaluator::new(
      store.clone(),
      locks.clone(),
      hub.clone(),
      clock.clone(),
      config.clone(),
    ));
    Ok(Coordinator {
      store,
      locks,
      hub,
      clock,
      config,
      manager,
      evaluator,
      components: Mutex::new(Vec::new()),
    })
  }

  /// 订阅事件流
  /// Subscribe to the event stream
  pub fn subscribe(&self) -> broadcast::Receiver<Event> {
    self.hub.subscribe()
  }

  /// 队列管理器
  /// The queue manager
  pub fn queue_manager(&self) -> &QueueManager {
    &self.manager
  }

  /// 启动后台组件
  /// Start the background components
  pub async fn start(&self) {
    let mut components = self.components.lock().await;
    if !components.is_empty() {
      warn!("Coordinator already started");
      return;
    }

    let watchdog = Arc::new(TimeoutWatchdog::new(
      self.evaluator.clone(),
      self.config.watchdog_interval,
    ));
    let handle = watchdog.clone().start();
    components.push((
      watchdog as Arc<dyn ComponentLifecycle + Send + Sync>,
      handle,
    ));

    let monitor = Arc::new(OfflineMonitor::new(
      self.store.clone(),
      self.locks.clone(),
      self.hub.clone(),
      self.clock.clone(),
      self.config.clone(),
    ));
    let handle = monitor.clone().start();
    components.push((monitor as Arc<dyn ComponentLifecycle + Send + Sync>, handle));

    info!("Coordination engine started");
  }

  /// 停止后台组件,单个组件最多等待 5 秒
  /// Stop the background components, waiting up to 5 seconds each
  pub async fn shutdown(&self) {
    info!("Shutting down coordination engine...");
    let mut components = self.components.lock().await;
    for (component, handle) in components.drain(..) {
      component.shutdown();
      if tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .is_err()
      {
        warn!("A component did not stop within 5 seconds");
      }
    }
    info!("Coordination engine stopped");
  }

  /// 注册新设备,编号重复返回 `DeviceExists`
  /// Register a new device, returning `DeviceExists` on a duplicate code
  pub async fn register_device(&self, spec: RegisterDevice) -> Result<DeviceSnapshot> {
    let device = self
      .store
      .insert_device(NewDevice {
        device_code: spec.device_code,
        name: spec.name,
        model: spec.model,
        location: spec.location,
        created_at: self.clock.now(),
      })
      .await?;
    let snapshot = self.snapshot(&device).await?;
    self.hub.publish(Event::DeviceListUpdate {
      action: ListAction::Create,
      device: snapshot.clone(),
    });
    info!("Device {} ({}) registered", device.device_code, device.id);
    Ok(snapshot)
  }

  /// 全部设备的快照
  /// Snapshots of every device
  pub async fn list_devices(&self) -> Result<Vec<DeviceSnapshot>> {
    let devices = self.store.devices().await?;
    let mut snapshots = Vec::with_capacity(devices.len());
    for device in &devices {
      snapshots.push(self.snapshot(device).await?);
    }
    Ok(snapshots)
  }

  /// 推导状态非离线的设备快照
  /// Snapshots of devices whose resolved status is not offline
  pub async fn online_devices(&self) -> Result<Vec<DeviceSnapshot>> {
    let mut snapshots = self.list_devices().await?;
    snapshots.retain(|snapshot| snapshot.status != DeviceStatus::Offline);
    Ok(snapshots)
  }

  /// 单台设备的快照
  /// Snapshot of one device
  pub async fn get_device(&self, device_id: i64) -> Result<DeviceSnapshot> {
    let Some(device) = self.store.device(device_id).await? else {
      return Err(Error::device_not_found(device_id));
    };
    self.snapshot(&device).await
  }

  /// 更新设备元数据,缺省字段不变
  /// Update device metadata; omitted fields stay unchanged
  pub async fn update_device(
    &self,
    device_id: i64,
    update: DeviceUpdate,
  ) -> Result<DeviceSnapshot> {
    let device = {
      let _guard = self.locks.acquire(device_id).await?;
      let Some(mut device) = self.store.device(device_id).await? else {
        return Err(Error::device_not_found(device_id));
      };
      if let Some(name) = update.name {
        device.name = name;
      }
      if let Some(model) = update.model {
        device.model = Some(model);
      }
      if let Some(location) = update.location {
        device.location = Some(location);
      }
      self.store.save_device(&device).await?;
      device
    };

    let snapshot = self.snapshot(&device).await?;
    self.hub.publish(Event::DeviceListUpdate {
      action: ListAction::Update,
      device: snapshot.clone(),
    });
    Ok(snapshot)
  }

  /// 删除设备及其队列
  /// Delete a device and its queue
  pub async fn delete_device(&self, device_id: i64) -> Result<()> {
    let snapshot = {
      let _guard = self.locks.acquire(device_id).await?;
      let Some(device) = self.store.device(device_id).await? else {
        return Err(Error::device_not_found(device_id));
      };
      let snapshot = self.snapshot(&device).await?;
      if !self.store.delete_device(device_id).await? {
        return Err(Error::device_not_found(device_id));
      }
      snapshot
    };
    self.locks.remove(device_id).await;

    self.hub.publish(Event::DeviceListUpdate {
      action: ListAction::Delete,
      device: snapshot,
    });
    info!("Device {device_id} deleted");
    Ok(())
  }

  /// 设置或清除人工覆盖状态
  /// Set or clear the manual status override
  ///
  /// `expires_at` 只在设置覆盖时生效;清除覆盖会同时丢弃过期时间
  /// `expires_at` only applies when setting an override; clearing it also
  /// drops the expiry
  pub async fn set_manual_status(
    &self,
    device_id: i64,
    req: ManualOverride,
  ) -> Result<DeviceSnapshot> {
    let device = {
      let _guard = self.locks.acquire(device_id).await?;
      let Some(mut device) = self.store.device(device_id).await? else {
        return Err(Error::device_not_found(device_id));
      };
      let now = self.clock.now();
      device.manual_status = req.status;
      device.manual_status_expires_at = if req.status.is_some() {
        req.expires_at
      } else {
        None
      };
      device.status = device.resolve_status(now, self.config.offline_threshold);
      self.store.save_device(&device).await?;
      device
    };

    let snapshot = self.snapshot(&device).await?;
    self.hub.publish(Event::DeviceStatusUpdate {
      device: snapshot.clone(),
    });
    // 覆盖变化可能让设备进出空闲,立即重估超时窗口
    // The override may move the device in or out of idle, so re-evaluate
    // the timeout window right away
    if let Err(e) = self.evaluator.evaluate_device(device_id).await {
      warn!("Timeout evaluation failed for device {device_id}: {e}");
    }
    Ok(snapshot)
  }

  /// 处理一次心跳上报
  /// Handle one heartbeat report
  ///
  /// 刷新心跳时间与任务字段并重新推导状态;进度首次到达 100 时
  /// 自动完成队首,转入空闲时立即重估超时窗口
  /// Refreshes the heartbeat time and task fields and re-resolves the status;
  /// the head auto-completes when progress first reaches 100, and turning
  /// idle re-evaluates the timeout window immediately
  pub async fn handle_heartbeat(
    &self,
    code: &str,
    report: HeartbeatReport,
  ) -> Result<DeviceSnapshot> {
    let Some(existing) = self.store.device_by_code(code).await? else {
      return Err(Error::device_not_found(code));
    };
    let device_id = existing.id;

    let (crossed_complete, became_idle) = {
      let _guard = self.locks.acquire(device_id).await?;
      let Some(mut device) = self.store.device(device_id).await? else {
        return Err(Error::device_not_found(code));
      };
      let now = self.clock.now();
      let prev_progress = device.task_progress;
      let prev_status = device.status;

      if let Some(hint) = &report.status_hint {
        debug!("Device {code} sent status hint {hint}");
      }
      device.last_heartbeat_at = Some(now);
      if report.task_id != device.task_id {
        device.task_started_at = report.task_id.as_ref().map(|_| now);
      }
      device.task_id = report.task_id;
      device.task_name = report.task_name;
      device.task_progress = report.task_progress.clamp(0, 100);
      if report.metrics.is_some() {
        device.metrics = report.metrics;
      }
      // 过期的人工覆盖顺带落库清除
      // Expired manual overrides are persisted away in passing
      if let Some(expires_at) = device.manual_status_expires_at {
        if now >= expires_at {
          device.manual_status = None;
          device.manual_status_expires_at = None;
        }
      }
      device.status = device.resolve_status(now, self.config.offline_threshold);
      self.store.save_device(&device).await?;
      (
        prev_progress != 100 && device.task_progress == 100,
        prev_status != DeviceStatus::Idle && device.status == DeviceStatus::Idle,
      )
    };

    if crossed_complete {
      // 心跳不能因为队列忙而失败,完成失败只告警
      // A heartbeat must not fail on queue contention, so a failed
      // auto-complete is only logged
      if let Err(e) = self.manager.complete(device_id).await {
        warn!("Auto-complete failed for device {device_id}: {e}");
      }
    }

    let Some(device) = self.store.device(device_id).await? else {
      return Err(Error::device_not_found(code));
    };
    let snapshot = self.snapshot(&device).await?;
    self.hub.publish(Event::DeviceStatusUpdate {
      device: snapshot.clone(),
    });

    if became_idle {
      if let Err(e) = self.evaluator.evaluate_device(device_id).await {
        warn!("Timeout evaluation failed for device {device_id}: {e}");
      }
    }
    Ok(snapshot)
  }

  /// 延长当前超时截止时间,返回新截止与累计延长次数
  /// Extend the current deadline, returning it and the extension count
  pub async fn extend_timeout(
    &self,
    device_id: i64,
    changed_by: &str,
    changed_by_id: &str,
  ) -> Result<(DateTime<Utc>, i32)> {
    self.evaluator.extend(device_id, changed_by, changed_by_id).await
  }

  async fn snapshot(&self, device: &Device) -> Result<DeviceSnapshot> {
    let queue_count = self.store.queue_count(device.id).await?;
    Ok(device.snapshot(queue_count, self.clock.now(), self.config.offline_threshold))
  }
}
