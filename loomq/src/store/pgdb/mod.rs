//! PostgreSQL 后端模块
//! PostgreSQL backend module

pub mod entity;
pub mod postgres_store;

pub use postgres_store::PostgresStore;
