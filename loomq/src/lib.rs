//! # Loomq - 设备状态与队列协调引擎 / Device Status & Queue Coordination Engine
//!
//! Loomq 跟踪一组车间设备的实时状态,并为每台设备维护一条严格有序的
//! 排队队列。
//! Loomq tracks the live status of a fleet of workshop devices and keeps one
//! strictly ordered waiting queue per device.
//!
//! ## 功能特性 / Features
//!
//! - **心跳驱动的状态机** 按离线 > 人工覆盖 > 任务进度的优先级推导状态
//!   **Heartbeat-driven state machine** resolving status by offline > manual
//!   override > task progress
//! - **严格有序队列** 位置始终为连续的 1..N,移动通过版本号做乐观并发控制
//!   **Strictly ordered queues** with contiguous 1..N positions and
//!   optimistic concurrency on moves
//! - **超时看守** 为空闲设备的队首布防窗口,先提醒后交换前两位
//!   **Timeout watchdog** arming a window for the head on idle devices,
//!   reminding first and swapping the first two slots on expiry
//! - **事件广播** 尽力而为地把每次变化推给订阅者
//!   **Event broadcast** pushing every change to subscribers best-effort
//! - **可插拔存储** 内置内存实现,`postgres` 特性启用 SeaORM 后端
//!   **Pluggable storage** with a built-in memory store and a SeaORM backend
//!   behind the `postgres` feature
//!
//! ## 快速开始 / Quick Start
//!
//! ```no_run
//! use loomq::device::RegisterDevice;
//! use loomq::manager::JoinRequest;
//! use loomq::store::MemoryStore;
//! use loomq::{Coordinator, EngineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> loomq::Result<()> {
//!   let store = Arc::new(MemoryStore::new());
//!   let coordinator = Coordinator::new(store, EngineConfig::default())?;
//!   coordinator.start().await;
//!
//!   let device = coordinator
//!     .register_device(RegisterDevice {
//!       device_code: "LOOM-A1".to_string(),
//!       name: "Loom A1".to_string(),
//!       model: None,
//!       location: None,
//!     })
//!     .await?;
//!
//!   coordinator
//!     .queue_manager()
//!     .join(JoinRequest {
//!       device_id: device.id,
//!       inspector_name: "wang".to_string(),
//!       created_by_id: "u-1001".to_string(),
//!       copies: 1,
//!     })
//!     .await?;
//!
//!   coordinator.shutdown().await;
//!   Ok(())
//! }
//! ```

pub mod clock;
pub mod components;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod events;
pub mod locks;
pub mod manager;
pub mod queue;
pub mod store;

pub use config::EngineConfig;
pub use coordinator::Coordinator;
pub use error::{Error, Result};
