//! 存储模块
//! Storage module
//!
//! 定义设备、队列与日志的持久化接口，并提供内存与 Postgres 两种实现
//! Defines the persistence interface for devices, queues and logs, with an
//! in-memory and a Postgres implementation

use crate::device::{Device, NewDevice};
use crate::error::Result;
use crate::queue::{NewQueueEntry, NewQueueLog, QueueEntry, QueueLog};
use async_trait::async_trait;
use chrono::NaiveDate;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod pgdb;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use pgdb::PostgresStore;

/// 存储接口
/// Storage interface
///
/// 实现只负责读写行,不做领域校验;排序与并发规则由上层在设备锁内保证
/// Implementations only read and write rows; ordering and concurrency rules
/// are enforced by callers holding the device lock
#[async_trait]
pub trait Store: Send + Sync {
  /// 插入新设备，编号重复时返回 `DeviceExists`
  /// Insert a new device, returning `DeviceExists` on a duplicate code
  async fn insert_device(&self, device: NewDevice) -> Result<Device>;

  /// 按 id 查找设备
  /// Look up a device by id
  async fn device(&self, device_id: i64) -> Result<Option<Device>>;

  /// 按设备编号查找设备
  /// Look up a device by its code
  async fn device_by_code(&self, code: &str) -> Result<Option<Device>>;

  /// 列出全部设备，按 id 升序
  /// List all devices ordered by id
  async fn devices(&self) -> Result<Vec<Device>>;

  /// 写回设备，设备不存在时返回 `DeviceNotFound`
  /// Write a device back, returning `DeviceNotFound` if it is gone
  async fn save_device(&self, device: &Device) -> Result<()>;

  /// 删除设备及其队列条目，返回是否存在
  /// Delete a device and its queue entries, returning whether it existed
  async fn delete_device(&self, device_id: i64) -> Result<bool>;

  /// 批量插入队列条目,按传入顺序分配 id
  /// Insert queue entries in bulk, assigning ids in the given order
  async fn insert_entries(&self, entries: Vec<NewQueueEntry>) -> Result<Vec<QueueEntry>>;

  /// 按 id 查找队列条目
  /// Look up a queue entry by id
  async fn entry(&self, entry_id: i64) -> Result<Option<QueueEntry>>;

  /// 某设备的全部条目，按位置升序
  /// All entries of one device ordered by position
  async fn entries_for_device(&self, device_id: i64) -> Result<Vec<QueueEntry>>;

  /// 写回一批条目，任何条目不存在时返回 `EntryNotFound`
  /// Write entries back, returning `EntryNotFound` if any of them is gone
  async fn save_entries(&self, entries: &[QueueEntry]) -> Result<()>;

  /// 删除队列条目，返回是否存在
  /// Remove a queue entry, returning whether it existed
  async fn remove_entry(&self, entry_id: i64) -> Result<bool>;

  /// 某设备的当前排队数量
  /// Current queue length of one device
  async fn queue_count(&self, device_id: i64) -> Result<usize>;

  /// 追加一条变更日志
  /// Append one change log row
  async fn append_log(&self, log: NewQueueLog) -> Result<QueueLog>;

  /// 某设备某天的日志，最新在前,最多 `limit` 条
  /// One device's logs for one day, newest first, capped at `limit`
  async fn logs_for_day(
    &self,
    device_id: i64,
    day: NaiveDate,
    limit: usize,
  ) -> Result<Vec<QueueLog>>;
}
