//! 预导入模块
//! Prelude module

pub use super::devices::Entity as Devices;
pub use super::queue_entries::Entity as QueueEntries;
pub use super::queue_logs::Entity as QueueLogs;
