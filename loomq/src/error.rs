//! 错误处理模块
//! Error handling module
//!
//! 定义了 Loomq 库中使用的各种错误类型
//! Defines various error types used in the Loomq library

use thiserror::Error;

/// Loomq 库的结果类型
/// Result type for the Loomq library
pub type Result<T> = std::result::Result<T, Error>;

/// Loomq 错误类型
/// Loomq error type
#[derive(Error, Debug)]
pub enum Error {
  /// 设备未找到错误
  /// Device not found error
  #[error("Device not found: {device}")]
  DeviceNotFound { device: String },

  /// 设备编号重复错误
  /// Duplicate device code error
  #[error("Device already exists: {code}")]
  DeviceExists { code: String },

  /// 队列条目未找到错误
  /// Queue entry not found error
  #[error("Queue entry not found: {entry_id}")]
  EntryNotFound { entry_id: i64 },

  /// 版本冲突错误 —— 调用方必须重新获取后重试
  /// Version conflict error - caller must refetch and retry
  #[error("Version conflict on entry {entry_id}: expected {expected}, actual {actual}")]
  VersionConflict {
    entry_id: i64,
    expected: i64,
    actual: i64,
  },

  /// 无效的排队份数
  /// Invalid number of queue copies
  #[error("Invalid copies: {copies} (must be at least 1)")]
  InvalidCopies { copies: u32 },

  /// 目标位置越界
  /// Reposition target out of range
  #[error("Invalid position: {position} (queue length {len})")]
  InvalidRange { position: i32, len: usize },

  /// 延长次数已达上限
  /// Extension limit reached
  #[error("Extend limit exceeded for device {device_id} (limit {limit})")]
  ExtendLimitExceeded { device_id: i64, limit: i32 },

  /// 当前没有已启动的超时截止
  /// No timeout deadline is currently armed
  #[error("No active timeout deadline for device {device_id}")]
  NoActiveDeadline { device_id: i64 },

  /// 设备锁获取超时
  /// Per-device lock acquisition timed out
  #[error("Lock timeout for device {device_id}")]
  LockTimeout { device_id: i64 },

  /// 配置错误
  /// Configuration error
  #[error("Configuration error: {message}")]
  Config { message: String },

  /// 存储后端错误
  /// Storage backend error
  #[error("Store error: {message}")]
  Store { message: String },

  #[cfg(feature = "postgres")]
  /// SeaORM 数据库错误
  /// SeaORM database error
  #[error("SeaORM database error: {0}")]
  Database(#[from] sea_orm::DbErr),
}

impl Error {
  /// 创建设备未找到错误
  /// Create a device-not-found error
  pub fn device_not_found<D: ToString>(device: D) -> Self {
    Self::DeviceNotFound {
      device: device.to_string(),
    }
  }

  /// 创建设备重复错误
  /// Create a duplicate-device error
  pub fn device_exists<S: Into<String>>(code: S) -> Self {
    Self::DeviceExists { code: code.into() }
  }

  /// 创建配置错误
  /// Create a configuration error
  pub fn config<S: Into<String>>(message: S) -> Self {
    Self::Config {
      message: message.into(),
    }
  }

  /// 创建存储错误
  /// Create a store error
  pub fn store<S: Into<String>>(message: S) -> Self {
    Self::Store {
      message: message.into(),
    }
  }

  /// 检查是否为可重试错误
  /// Check if the error is retriable
  pub fn is_retriable(&self) -> bool {
    match self {
      Error::LockTimeout { .. } => return true,
      Error::DeviceNotFound { .. } => {}
      Error::DeviceExists { .. } => {}
      Error::EntryNotFound { .. } => {}
      Error::VersionConflict { .. } => {}
      Error::InvalidCopies { .. } => {}
      Error::InvalidRange { .. } => {}
      Error::ExtendLimitExceeded { .. } => {}
      Error::NoActiveDeadline { .. } => {}
      Error::Config { .. } => {}
      Error::Store { .. } => {}
      #[cfg(feature = "postgres")]
      Error::Database(_) => return true,
    }
    false
  }

  /// 检查是否为致命错误
  /// Check if the error is fatal
  pub fn is_fatal(&self) -> bool {
    !self.is_retriable()
  }
}
