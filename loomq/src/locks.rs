//! 设备锁模块
//! Device lock module
//!
//! 为每台设备维护独立的异步互斥锁，串行化对设备与其队列的修改
//! Keeps one async mutex per device to serialize mutations of the device and
//! its queue; devices never contend with each other

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// 按设备 id 索引的互斥锁表
/// Mutex table keyed by device id
#[derive(Debug)]
pub struct DeviceLocks {
  locks: RwLock<HashMap<i64, Arc<Mutex<()>>>>,
  timeout: Duration,
}

impl DeviceLocks {
  /// 创建锁表，`timeout` 为单次获取的等待上限
  /// Create the table; `timeout` caps how long a single acquire may wait
  pub fn new(timeout: Duration) -> Self {
    DeviceLocks {
      locks: RwLock::new(HashMap::new()),
      timeout,
    }
  }

  async fn lock_for(&self, device_id: i64) -> Arc<Mutex<()>> {
    {
      let locks = self.locks.read().await;
      if let Some(lock) = locks.get(&device_id) {
        return lock.clone();
      }
    }
    let mut locks = self.locks.write().await;
    locks
      .entry(device_id)
      .or_insert_with(|| Arc::new(Mutex::new(())))
      .clone()
  }

  /// 获取设备锁，超过等待上限返回 `LockTimeout`
  /// Acquire the device lock, returning `LockTimeout` past the wait cap
  pub async fn acquire(&self, device_id: i64) -> Result<OwnedMutexGuard<()>> {
    let lock = self.lock_for(device_id).await;
    tokio::time::timeout(self.timeout, lock.lock_owned())
      .await
      .map_err(|_| Error::LockTimeout { device_id })
  }

  /// 删除设备后回收其锁
  /// Drop the lock of a deleted device
  pub async fn remove(&self, device_id: i64) {
    let mut locks = self.locks.write().await;
    locks.remove(&device_id);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_acquire_is_exclusive_per_device() {
    let locks = Arc::new(DeviceLocks::new(Duration::from_millis(50)));

    let guard = locks.acquire(1).await.unwrap();
    // 同一设备的第二次获取会超时
    // A second acquire on the same device times out
    let err = locks.acquire(1).await.unwrap_err();
    assert!(matches!(err, Error::LockTimeout { device_id: 1 }));

    // 其他设备不受影响
    // Other devices are unaffected
    let other = locks.acquire(2).await;
    assert!(other.is_ok());

    drop(guard);
    let again = locks.acquire(1).await;
    assert!(again.is_ok());
  }

  #[tokio::test]
  async fn test_remove_recycles_lock() {
    let locks = DeviceLocks::new(Duration::from_millis(50));
    let guard = locks.acquire(5).await.unwrap();
    locks.remove(5).await;
    drop(guard);
    assert!(locks.acquire(5).await.is_ok());
  }
}
