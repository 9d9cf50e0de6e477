//! 后台组件模块
//! Background component module
//!
//! 协调器启动的周期性组件:队列超时看守和离线监视器
//! Periodic components started by the coordinator: the queue timeout watchdog
//! and the offline monitor

use std::sync::Arc;
use tokio::task::JoinHandle;

pub mod offline;
pub mod watchdog;

pub use offline::OfflineMonitor;
pub use watchdog::{TimeoutEvaluator, TimeoutWatchdog};

/// 组件生命周期
/// Component lifecycle
///
/// 每个组件在独立任务中按固定间隔运行,`shutdown` 置位后在下一个
/// 检查点退出循环
/// Each component runs on its own task at a fixed interval and leaves the
/// loop at the next checkpoint after `shutdown` is flagged
pub trait ComponentLifecycle {
  /// 启动组件,返回其任务句柄
  /// Start the component, returning its task handle
  fn start(self: Arc<Self>) -> JoinHandle<()>;

  /// 请求组件停止
  /// Ask the component to stop
  fn shutdown(&self);

  /// 组件是否已退出循环
  /// Whether the component has left its loop
  fn is_done(&self) -> bool;
}
