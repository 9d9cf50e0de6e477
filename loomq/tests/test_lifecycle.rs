//! 协调器生命周期集成测试
//! Coordinator lifecycle integration tests
//!
//! 验证后台组件的启动、运行和停机
//! Verifies that the background components start, run and shut down

use loomq::device::{DeviceUpdate, HeartbeatReport, RegisterDevice};
use loomq::events::{Event, ListAction};
use loomq::manager::JoinRequest;
use loomq::store::{MemoryStore, Store};
use loomq::{Coordinator, EngineConfig};
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> EngineConfig {
  EngineConfig::new()
    .watchdog_interval(Duration::from_millis(10))
    .offline_sweep_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn test_start_runs_watchdog_until_shutdown() {
  let store = Arc::new(MemoryStore::new());
  let coordinator = Coordinator::new(store.clone(), fast_config()).unwrap();

  let device = coordinator
    .register_device(RegisterDevice {
      device_code: "LOOM-A1".to_string(),
      name: "Loom A1".to_string(),
      model: None,
      location: None,
    })
    .await
    .unwrap();
  coordinator
    .handle_heartbeat("LOOM-A1", HeartbeatReport::default())
    .await
    .unwrap();
  for inspector in ["wang", "li"] {
    coordinator
      .queue_manager()
      .join(JoinRequest {
        device_id: device.id,
        inspector_name: inspector.to_string(),
        created_by_id: format!("u-{inspector}"),
        copies: 1,
      })
      .await
      .unwrap();
  }
  // 入队本身不布防,要等巡检循环跑起来
  // Joining alone does not arm the window; that takes the patrol loop
  assert!(store
    .device(device.id)
    .await
    .unwrap()
    .unwrap()
    .queue_timeout_deadline_at
    .is_none());

  coordinator.start().await;
  tokio::time::sleep(Duration::from_millis(100)).await;

  let armed = store.device(device.id).await.unwrap().unwrap();
  assert!(armed.queue_timeout_deadline_at.is_some());
  assert_eq!(armed.queue_timeout_extended_count, 0);

  coordinator.shutdown().await;
}

#[tokio::test]
async fn test_start_twice_is_harmless() {
  let store = Arc::new(MemoryStore::new());
  let coordinator = Coordinator::new(store, fast_config()).unwrap();

  coordinator.start().await;
  coordinator.start().await;
  tokio::time::sleep(Duration::from_millis(30)).await;
  coordinator.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_without_start() {
  let store = Arc::new(MemoryStore::new());
  let coordinator = Coordinator::new(store, EngineConfig::default()).unwrap();
  coordinator.shutdown().await;
}

#[tokio::test]
async fn test_device_crud_broadcasts_list_updates() {
  let store = Arc::new(MemoryStore::new());
  let coordinator = Coordinator::new(store, EngineConfig::default()).unwrap();
  let mut rx = coordinator.subscribe();

  let device = coordinator
    .register_device(RegisterDevice {
      device_code: "LOOM-A1".to_string(),
      name: "Loom A1".to_string(),
      model: None,
      location: None,
    })
    .await
    .unwrap();
  coordinator
    .update_device(
      device.id,
      DeviceUpdate {
        name: Some("Loom A1 East".to_string()),
        ..Default::default()
      },
    )
    .await
    .unwrap();
  coordinator.delete_device(device.id).await.unwrap();

  let mut actions = Vec::new();
  while let Ok(event) = rx.try_recv() {
    if let Event::DeviceListUpdate { action, device } = event {
      actions.push((action, device.name.clone()));
    }
  }
  assert_eq!(
    actions,
    vec![
      (ListAction::Create, "Loom A1".to_string()),
      (ListAction::Update, "Loom A1 East".to_string()),
      (ListAction::Delete, "Loom A1 East".to_string()),
    ]
  );
}
