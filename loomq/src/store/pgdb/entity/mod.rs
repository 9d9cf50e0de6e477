//! SeaORM 实体模块
//! SeaORM entity module
//!
//! 定义与 PostgreSQL 表对应的实体模型
//! Defines entity models corresponding to PostgreSQL tables

pub mod devices;
pub mod prelude;
pub mod queue_entries;
pub mod queue_logs;

pub use prelude::*;
