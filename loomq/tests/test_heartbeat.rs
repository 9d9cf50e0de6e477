//! 心跳与设备状态集成测试
//! Heartbeat and device status integration tests
//!
//! 覆盖状态推导优先级、人工覆盖、自动完成、离线扫描和设备登记
//! Covers status precedence, manual overrides, auto-complete, the offline
//! sweep and the device registry

use chrono::Utc;
use loomq::clock::{Clock, ManualClock};
use loomq::components::OfflineMonitor;
use loomq::device::{
  DeviceSnapshot, DeviceStatus, DeviceUpdate, HeartbeatReport, ManualOverride, ManualStatus,
  NewDevice, RegisterDevice,
};
use loomq::error::Error;
use loomq::events::{Event, EventHub};
use loomq::locks::DeviceLocks;
use loomq::manager::JoinRequest;
use loomq::store::{MemoryStore, Store};
use loomq::{Coordinator, EngineConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

async fn setup() -> (Arc<MemoryStore>, Coordinator, Arc<ManualClock>) {
  let store = Arc::new(MemoryStore::new());
  let clock = Arc::new(ManualClock::new(Utc::now()));
  let coordinator =
    Coordinator::with_clock(store.clone(), EngineConfig::default(), clock.clone()).unwrap();
  (store, coordinator, clock)
}

async fn register(coordinator: &Coordinator, code: &str) -> i64 {
  coordinator
    .register_device(RegisterDevice {
      device_code: code.to_string(),
      name: format!("Loom {code}"),
      model: Some("R9500".to_string()),
      location: Some("Hall 1".to_string()),
    })
    .await
    .unwrap()
    .id
}

async fn beat(coordinator: &Coordinator, code: &str, progress: i32) -> DeviceSnapshot {
  coordinator
    .handle_heartbeat(
      code,
      HeartbeatReport {
        task_progress: progress,
        ..Default::default()
      },
    )
    .await
    .unwrap()
}

async fn join(coordinator: &Coordinator, device_id: i64, inspector: &str) {
  coordinator
    .queue_manager()
    .join(JoinRequest {
      device_id,
      inspector_name: inspector.to_string(),
      created_by_id: format!("u-{inspector}"),
      copies: 1,
    })
    .await
    .unwrap();
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  events
}

#[tokio::test]
async fn test_heartbeat_unknown_code() {
  let (_store, coordinator, _clock) = setup().await;
  let err = coordinator
    .handle_heartbeat("NOPE", HeartbeatReport::default())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DeviceNotFound { .. }));
}

#[tokio::test]
async fn test_heartbeat_derives_busy_and_idle() {
  let (_store, coordinator, clock) = setup().await;
  register(&coordinator, "LOOM-A1").await;

  let snapshot = beat(&coordinator, "LOOM-A1", 0).await;
  assert_eq!(snapshot.status, DeviceStatus::Idle);
  assert_eq!(snapshot.last_heartbeat_at, Some(clock.now()));

  let snapshot = beat(&coordinator, "LOOM-A1", 40).await;
  assert_eq!(snapshot.status, DeviceStatus::Busy);

  let snapshot = beat(&coordinator, "LOOM-A1", 0).await;
  assert_eq!(snapshot.status, DeviceStatus::Idle);
}

#[tokio::test]
async fn test_heartbeat_tracks_task_fields() {
  let (_store, coordinator, clock) = setup().await;
  register(&coordinator, "LOOM-A1").await;
  let started = clock.now();

  let snapshot = coordinator
    .handle_heartbeat(
      "LOOM-A1",
      HeartbeatReport {
        task_id: Some("T-9".to_string()),
        task_name: Some("Denim run".to_string()),
        task_progress: 40,
        metrics: Some(json!({"rpm": 1800})),
        ..Default::default()
      },
    )
    .await
    .unwrap();
  assert_eq!(snapshot.task_id.as_deref(), Some("T-9"));
  assert_eq!(snapshot.task_name.as_deref(), Some("Denim run"));
  assert_eq!(snapshot.task_started_at, Some(started));
  assert_eq!(snapshot.metrics, Some(json!({"rpm": 1800})));

  // 同一任务继续上报不改开始时间,未带指标时保留上次值
  // Continuing the same task keeps the start time; reports without metrics
  // keep the last value
  clock.advance(Duration::from_secs(5));
  let snapshot = coordinator
    .handle_heartbeat(
      "LOOM-A1",
      HeartbeatReport {
        task_id: Some("T-9".to_string()),
        task_name: Some("Denim run".to_string()),
        task_progress: 60,
        ..Default::default()
      },
    )
    .await
    .unwrap();
  assert_eq!(snapshot.task_started_at, Some(started));
  assert_eq!(snapshot.metrics, Some(json!({"rpm": 1800})));

  // 任务切换重置开始时间
  // Switching tasks resets the start time
  clock.advance(Duration::from_secs(5));
  let snapshot = coordinator
    .handle_heartbeat(
      "LOOM-A1",
      HeartbeatReport {
        task_id: Some("T-10".to_string()),
        task_progress: 5,
        ..Default::default()
      },
    )
    .await
    .unwrap();
  assert_eq!(snapshot.task_started_at, Some(clock.now()));
}

#[tokio::test]
async fn test_heartbeat_clamps_progress() {
  let (store, coordinator, _clock) = setup().await;
  let id = register(&coordinator, "LOOM-A1").await;

  beat(&coordinator, "LOOM-A1", 150).await;
  assert_eq!(store.device(id).await.unwrap().unwrap().task_progress, 100);

  beat(&coordinator, "LOOM-A1", -5).await;
  assert_eq!(store.device(id).await.unwrap().unwrap().task_progress, 0);
}

#[tokio::test]
async fn test_manual_override_precedence() {
  let (_store, coordinator, clock) = setup().await;
  let id = register(&coordinator, "LOOM-A1").await;
  beat(&coordinator, "LOOM-A1", 0).await;

  let snapshot = coordinator
    .set_manual_status(
      id,
      ManualOverride {
        status: Some(ManualStatus::Maintenance),
        expires_at: None,
      },
    )
    .await
    .unwrap();
  assert_eq!(snapshot.status, DeviceStatus::Maintenance);

  // 人工覆盖压过任务进度
  // The manual override beats task progress
  let snapshot = beat(&coordinator, "LOOM-A1", 50).await;
  assert_eq!(snapshot.status, DeviceStatus::Maintenance);

  // 离线压过人工覆盖
  // Offline beats the manual override
  clock.advance(Duration::from_secs(31));
  let snapshot = coordinator.get_device(id).await.unwrap();
  assert_eq!(snapshot.status, DeviceStatus::Offline);

  // 心跳恢复后覆盖重新生效
  // The override applies again once the heartbeat returns
  let snapshot = beat(&coordinator, "LOOM-A1", 50).await;
  assert_eq!(snapshot.status, DeviceStatus::Maintenance);

  // 清除覆盖回到按进度推导
  // Clearing the override falls back to progress
  let snapshot = coordinator
    .set_manual_status(id, ManualOverride::default())
    .await
    .unwrap();
  assert_eq!(snapshot.status, DeviceStatus::Busy);
}

#[tokio::test]
async fn test_manual_override_expires() {
  let (store, coordinator, clock) = setup().await;
  let id = register(&coordinator, "LOOM-A1").await;
  beat(&coordinator, "LOOM-A1", 0).await;

  let expires = clock.now() + chrono::Duration::seconds(60);
  let snapshot = coordinator
    .set_manual_status(
      id,
      ManualOverride {
        status: Some(ManualStatus::Error),
        expires_at: Some(expires),
      },
    )
    .await
    .unwrap();
  assert_eq!(snapshot.status, DeviceStatus::Error);

  clock.advance(Duration::from_secs(10));
  let snapshot = beat(&coordinator, "LOOM-A1", 0).await;
  assert_eq!(snapshot.status, DeviceStatus::Error);

  // 过期后回到推导状态,心跳顺带清掉覆盖字段
  // Past the expiry the derived status returns and the heartbeat clears the
  // override fields in passing
  clock.advance(Duration::from_secs(51));
  let snapshot = beat(&coordinator, "LOOM-A1", 0).await;
  assert_eq!(snapshot.status, DeviceStatus::Idle);
  let device = store.device(id).await.unwrap().unwrap();
  assert!(device.manual_status.is_none());
  assert!(device.manual_status_expires_at.is_none());
}

#[tokio::test]
async fn test_progress_100_autocompletes_head() {
  let (_store, coordinator, _clock) = setup().await;
  let id = register(&coordinator, "LOOM-A1").await;
  beat(&coordinator, "LOOM-A1", 0).await;
  join(&coordinator, id, "wang").await;
  join(&coordinator, id, "li").await;

  let snapshot = beat(&coordinator, "LOOM-A1", 100).await;
  assert_eq!(snapshot.queue_count, 1);
  let view = coordinator.queue_manager().queue(id).await.unwrap();
  assert_eq!(view.queue.len(), 1);
  assert_eq!(view.queue[0].inspector_name, "li");
  assert_eq!(view.queue[0].position, 1);

  // 停留在 100 的重复心跳不再出队
  // Repeated heartbeats sitting at 100 do not dequeue again
  let snapshot = beat(&coordinator, "LOOM-A1", 100).await;
  assert_eq!(snapshot.queue_count, 1);

  // 回落后再次到达 100 才算新的完成
  // Only reaching 100 again after dropping counts as a new completion
  beat(&coordinator, "LOOM-A1", 0).await;
  let snapshot = beat(&coordinator, "LOOM-A1", 100).await;
  assert_eq!(snapshot.queue_count, 0);

  // 空队列时到达 100 不报错
  // Reaching 100 with an empty queue is not an error
  beat(&coordinator, "LOOM-A1", 0).await;
  let snapshot = beat(&coordinator, "LOOM-A1", 100).await;
  assert_eq!(snapshot.queue_count, 0);
}

#[tokio::test]
async fn test_idle_transition_arms_watchdog_immediately() {
  let (store, coordinator, _clock) = setup().await;
  let id = register(&coordinator, "LOOM-A1").await;
  beat(&coordinator, "LOOM-A1", 60).await;
  join(&coordinator, id, "wang").await;
  join(&coordinator, id, "li").await;

  // 忙碌期间不布防
  // No window while busy
  assert!(store
    .device(id)
    .await
    .unwrap()
    .unwrap()
    .queue_timeout_deadline_at
    .is_none());

  beat(&coordinator, "LOOM-A1", 0).await;
  let device = store.device(id).await.unwrap().unwrap();
  assert!(device.queue_timeout_deadline_at.is_some());
  assert!(device.queue_timeout_active_entry_id.is_some());
}

#[tokio::test]
async fn test_heartbeat_broadcasts_snapshot() {
  let (_store, coordinator, _clock) = setup().await;
  register(&coordinator, "LOOM-A1").await;
  let mut rx = coordinator.subscribe();

  beat(&coordinator, "LOOM-A1", 0).await;
  beat(&coordinator, "LOOM-A1", 30).await;

  let events = drain(&mut rx);
  assert_eq!(events.len(), 2);
  assert!(events
    .iter()
    .all(|event| matches!(event, Event::DeviceStatusUpdate { .. })));
}

#[tokio::test]
async fn test_offline_sweep_marks_and_notifies() {
  let store = Arc::new(MemoryStore::new());
  let clock = Arc::new(ManualClock::new(Utc::now()));
  let config = EngineConfig::default();
  let hub = EventHub::new(config.event_buffer);
  let monitor = OfflineMonitor::new(
    store.clone(),
    Arc::new(DeviceLocks::new(config.lock_timeout)),
    hub.clone(),
    clock.clone(),
    config.clone(),
  );

  let mut device = store
    .insert_device(NewDevice {
      device_code: "LOOM-A1".to_string(),
      name: "Loom A1".to_string(),
      model: None,
      location: None,
      created_at: clock.now(),
    })
    .await
    .unwrap();
  let last_seen = clock.now();
  device.status = DeviceStatus::Idle;
  device.last_heartbeat_at = Some(last_seen);
  store.save_device(&device).await.unwrap();

  let mut rx = hub.subscribe();
  clock.advance(Duration::from_secs(31));
  monitor.sweep().await;

  let events = drain(&mut rx);
  let offline = events
    .iter()
    .find(|event| matches!(event, Event::DeviceOffline { .. }))
    .expect("a device_offline event must be broadcast");
  match offline {
    Event::DeviceOffline {
      device_name,
      last_seen: seen,
      ..
    } => {
      assert_eq!(device_name, "Loom A1");
      assert_eq!(*seen, Some(last_seen));
    }
    _ => unreachable!(),
  }
  assert!(events.iter().any(|event| matches!(
    event,
    Event::DeviceStatusUpdate { device } if device.status == DeviceStatus::Offline
  )));

  // 第二轮扫描不再重复通知
  // A second sweep does not notify again
  monitor.sweep().await;
  assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_register_rejects_duplicate_code() {
  let (_store, coordinator, _clock) = setup().await;
  register(&coordinator, "LOOM-A1").await;

  let err = coordinator
    .register_device(RegisterDevice {
      device_code: "LOOM-A1".to_string(),
      name: "Other".to_string(),
      model: None,
      location: None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DeviceExists { .. }));
}

#[tokio::test]
async fn test_new_device_starts_offline_with_empty_queue() {
  let (_store, coordinator, _clock) = setup().await;
  let id = register(&coordinator, "LOOM-A1").await;

  let snapshot = coordinator.get_device(id).await.unwrap();
  assert_eq!(snapshot.status, DeviceStatus::Offline);
  assert_eq!(snapshot.queue_count, 0);
  assert!(snapshot.last_heartbeat_at.is_none());
}

#[tokio::test]
async fn test_update_device_metadata() {
  let (_store, coordinator, _clock) = setup().await;
  let id = register(&coordinator, "LOOM-A1").await;

  let snapshot = coordinator
    .update_device(
      id,
      DeviceUpdate {
        name: Some("Rapier 8".to_string()),
        location: Some("Hall 2".to_string()),
        model: None,
      },
    )
    .await
    .unwrap();
  assert_eq!(snapshot.name, "Rapier 8");
  assert_eq!(snapshot.location.as_deref(), Some("Hall 2"));
  // 未提供的字段保持原值
  // Omitted fields keep their value
  assert_eq!(snapshot.model.as_deref(), Some("R9500"));

  let err = coordinator
    .update_device(999, DeviceUpdate::default())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DeviceNotFound { .. }));
}

#[tokio::test]
async fn test_delete_device_cascades_queue() {
  let (store, coordinator, _clock) = setup().await;
  let id = register(&coordinator, "LOOM-A1").await;
  beat(&coordinator, "LOOM-A1", 0).await;
  join(&coordinator, id, "wang").await;
  join(&coordinator, id, "li").await;

  coordinator.delete_device(id).await.unwrap();

  let err = coordinator.get_device(id).await.unwrap_err();
  assert!(matches!(err, Error::DeviceNotFound { .. }));
  let err = coordinator.queue_manager().queue(id).await.unwrap_err();
  assert!(matches!(err, Error::DeviceNotFound { .. }));
  assert_eq!(store.queue_count(id).await.unwrap(), 0);

  // 编号随设备删除而释放
  // The code is freed with the device
  register(&coordinator, "LOOM-A1").await;
}

#[tokio::test]
async fn test_list_and_online_devices() {
  let (_store, coordinator, _clock) = setup().await;
  register(&coordinator, "LOOM-A1").await;
  register(&coordinator, "LOOM-B2").await;
  beat(&coordinator, "LOOM-A1", 0).await;

  let all = coordinator.list_devices().await.unwrap();
  assert_eq!(all.len(), 2);

  let online = coordinator.online_devices().await.unwrap();
  assert_eq!(online.len(), 1);
  assert_eq!(online[0].device_code, "LOOM-A1");
}
