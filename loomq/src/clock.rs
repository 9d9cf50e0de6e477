//! 时钟模块
//! Clock module
//!
//! 心跳年龄与截止时间判断所用的时间源
//! Time source used for heartbeat-age and deadline checks

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// 时钟接口 —— 生产环境用系统时钟，测试用可控时钟
/// Clock interface - system clock in production, a controllable clock in tests
pub trait Clock: Send + Sync {
  /// 当前时间
  /// Current time
  fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
/// System clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// 手动时钟，时间只在显式推进时变化
/// Manual clock whose time only moves when explicitly advanced
///
/// 用毫秒时间戳存储，便于无锁共享
/// Stored as a millisecond timestamp so it can be shared without locking
#[derive(Debug)]
pub struct ManualClock {
  now_ms: AtomicI64,
}

impl ManualClock {
  /// 以给定起点创建手动时钟
  /// Create a manual clock at the given starting instant
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      now_ms: AtomicI64::new(start.timestamp_millis()),
    }
  }

  /// 设置当前时间
  /// Set the current time
  pub fn set(&self, instant: DateTime<Utc>) {
    self.now_ms.store(instant.timestamp_millis(), Ordering::SeqCst);
  }

  /// 向前推进时间
  /// Advance the clock forward
  pub fn advance(&self, delta: Duration) {
    self
      .now_ms
      .fetch_add(delta.as_millis() as i64, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(self.now_ms.load(Ordering::SeqCst)).unwrap_or_default()
  }
}

/// 把标准库时长转换为 chrono 时长，毫秒精度足够
/// Convert a std duration into a chrono duration, millisecond precision is enough
pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
  chrono::Duration::milliseconds(duration.as_millis() as i64)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_manual_clock_advance() {
    let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);

    clock.advance(Duration::from_secs(61));
    assert_eq!(clock.now(), start + chrono::Duration::seconds(61));

    clock.set(start);
    assert_eq!(clock.now(), start);
  }

  #[test]
  fn test_to_chrono() {
    assert_eq!(
      to_chrono(Duration::from_secs(30)),
      chrono::Duration::seconds(30)
    );
    assert_eq!(
      to_chrono(Duration::from_millis(1500)),
      chrono::Duration::milliseconds(1500)
    );
  }
}
