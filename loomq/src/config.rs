//! 配置模块
//! Configuration module
//!
//! 定义了协调引擎的配置选项
//! Defines configuration options for the coordination engine

use crate::error::{Error, Result};
use std::time::Duration;

/// 引擎配置
/// Engine configuration
///
/// 所有时长都是带默认值的配置项，而不是硬编码常量
/// Every duration is a configurable knob with a default, not a hard constant
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// 心跳超过该时长视为离线
  /// Heartbeat older than this means the device is offline
  pub offline_threshold: Duration,
  /// 离线巡检间隔
  /// Offline sweep interval
  pub offline_sweep_interval: Duration,
  /// 超时看门狗巡检间隔
  /// Timeout watchdog tick interval
  pub watchdog_interval: Duration,
  /// 队首超时基础窗口
  /// Base timeout window for the head-of-queue slot
  pub timeout_window: Duration,
  /// 到期前提醒的提前量
  /// Lead time before expiry for the one-shot reminder
  pub reminder_lead: Duration,
  /// 每次延长的增量
  /// Increment added by each extension
  pub extension_increment: Duration,
  /// 延长次数上限
  /// Maximum number of extensions
  pub max_extensions: i32,
  /// 设备锁获取超时
  /// Per-device lock acquisition timeout
  pub lock_timeout: Duration,
  /// 事件广播缓冲区大小
  /// Event broadcast buffer size
  pub event_buffer: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      offline_threshold: Duration::from_secs(30),
      offline_sweep_interval: Duration::from_secs(10),
      watchdog_interval: Duration::from_secs(2),
      timeout_window: Duration::from_secs(60),
      reminder_lead: Duration::from_secs(15),
      extension_increment: Duration::from_secs(5 * 60),
      max_extensions: 3,
      lock_timeout: Duration::from_secs(5),
      event_buffer: 256,
    }
  }
}

impl EngineConfig {
  /// 创建新的引擎配置
  /// Create a new engine configuration
  pub fn new() -> Self {
    Self::default()
  }

  /// 设置离线判定阈值
  /// Set the offline threshold
  pub fn offline_threshold(mut self, threshold: Duration) -> Self {
    self.offline_threshold = threshold;
    self
  }

  /// 设置离线巡检间隔
  /// Set the offline sweep interval
  pub fn offline_sweep_interval(mut self, interval: Duration) -> Self {
    self.offline_sweep_interval = interval;
    self
  }

  /// 设置看门狗巡检间隔
  /// Set the watchdog tick interval
  pub fn watchdog_interval(mut self, interval: Duration) -> Self {
    self.watchdog_interval = interval;
    self
  }

  /// 设置超时基础窗口
  /// Set the base timeout window
  pub fn timeout_window(mut self, window: Duration) -> Self {
    self.timeout_window = window;
    self
  }

  /// 设置提醒提前量
  /// Set the reminder lead time
  pub fn reminder_lead(mut self, lead: Duration) -> Self {
    self.reminder_lead = lead;
    self
  }

  /// 设置延长增量
  /// Set the extension increment
  pub fn extension_increment(mut self, increment: Duration) -> Self {
    self.extension_increment = increment;
    self
  }

  /// 设置延长次数上限
  /// Set the maximum number of extensions
  pub fn max_extensions(mut self, max: i32) -> Self {
    self.max_extensions = max.max(0);
    self
  }

  /// 设置锁获取超时
  /// Set the lock acquisition timeout
  pub fn lock_timeout(mut self, timeout: Duration) -> Self {
    self.lock_timeout = timeout;
    self
  }

  /// 设置事件缓冲区大小
  /// Set the event buffer size
  pub fn event_buffer(mut self, buffer: usize) -> Self {
    self.event_buffer = buffer.max(1);
    self
  }

  /// 验证配置
  /// Validate the configuration
  pub fn validate(&self) -> Result<()> {
    if self.offline_threshold.is_zero() {
      return Err(Error::config("Offline threshold must be greater than zero"));
    }
    if self.offline_sweep_interval.is_zero() {
      return Err(Error::config(
        "Offline sweep interval must be greater than zero",
      ));
    }
    if self.watchdog_interval.is_zero() {
      return Err(Error::config("Watchdog interval must be greater than zero"));
    }
    if self.timeout_window.is_zero() {
      return Err(Error::config("Timeout window must be greater than zero"));
    }
    if self.reminder_lead >= self.timeout_window {
      return Err(Error::config(
        "Reminder lead must be shorter than the timeout window",
      ));
    }
    if self.extension_increment.is_zero() {
      return Err(Error::config(
        "Extension increment must be greater than zero",
      ));
    }
    if self.max_extensions < 0 {
      return Err(Error::config("Extension limit cannot be negative"));
    }
    if self.lock_timeout.is_zero() {
      return Err(Error::config("Lock timeout must be greater than zero"));
    }
    if self.event_buffer == 0 {
      return Err(Error::config("Event buffer must hold at least one event"));
    }
    Ok(())
  }
}
