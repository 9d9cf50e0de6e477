//! PostgreSQL 存储实现
//! PostgreSQL storage implementation
//!
//! 使用 SeaORM 实现设备、队列与日志的持久化
//! Implements device, queue and log persistence using SeaORM

use crate::device::{Device, NewDevice};
use crate::error::{Error, Result};
use crate::queue::{NewQueueEntry, NewQueueLog, QueueEntry, QueueLog};
use crate::store::pgdb::entity::{devices, queue_entries, queue_logs, Devices, QueueEntries, QueueLogs};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::{
  ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
  DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Schema, Set,
};

/// PostgreSQL 存储
/// PostgreSQL store
pub struct PostgresStore {
  db: DatabaseConnection,
}

impl PostgresStore {
  /// 从连接字符串创建存储并初始化 schema
  /// Create a store from a connection string and initialize the schema
  pub async fn new(database_url: &str) -> Result<Self> {
    let opt = ConnectOptions::new(database_url)
      .max_connections(10)
      .to_owned();
    let db = Database::connect(opt).await?;
    let store = Self { db };
    store.init_schema().await?;
    Ok(store)
  }

  /// 从现有数据库连接创建存储
  /// Create a store from an existing database connection
  pub fn from_connection(db: DatabaseConnection) -> Self {
    Self { db }
  }

  /// 获取数据库连接
  /// Get the database connection
  pub fn db(&self) -> &DatabaseConnection {
    &self.db
  }

  /// 初始化数据库 schema
  /// Initialize the database schema
  pub async fn init_schema(&self) -> Result<()> {
    let backend = self.db.get_database_backend();
    let schema = Schema::new(backend);

    let stmt = schema.create_table_from_entity(Devices);
    let _ = self.db.execute(backend.build(&stmt)).await;

    let stmt = schema.create_table_from_entity(QueueEntries);
    let _ = self.db.execute(backend.build(&stmt)).await;

    let stmt = schema.create_table_from_entity(QueueLogs);
    let _ = self.db.execute(backend.build(&stmt)).await;

    // Create indexes using raw SQL (SeaORM doesn't have index creation API in schema)
    let index_sql = r#"
      CREATE INDEX IF NOT EXISTS idx_loomq_entries_device_position ON loomq_queue_entries(device_id, position);
      CREATE INDEX IF NOT EXISTS idx_loomq_logs_device_time ON loomq_queue_logs(device_id, change_time DESC);
      CREATE INDEX IF NOT EXISTS idx_loomq_devices_heartbeat ON loomq_devices(last_heartbeat_at);
    "#;
    let _ = self
      .db
      .execute(sea_orm::Statement::from_string(backend, index_sql))
      .await;

    Ok(())
  }

  fn device_active(device: &Device) -> devices::ActiveModel {
    devices::ActiveModel {
      id: Set(device.id),
      device_code: Set(device.device_code.clone()),
      name: Set(device.name.clone()),
      model: Set(device.model.clone()),
      location: Set(device.location.clone()),
      status: Set(device.status.into()),
      last_heartbeat_at: Set(device.last_heartbeat_at.map(Into::into)),
      manual_status: Set(device.manual_status.map(Into::into)),
      manual_status_expires_at: Set(device.manual_status_expires_at.map(Into::into)),
      task_id: Set(device.task_id.clone()),
      task_name: Set(device.task_name.clone()),
      task_progress: Set(device.task_progress),
      task_started_at: Set(device.task_started_at.map(Into::into)),
      metrics: Set(device.metrics.clone()),
      queue_timeout_active_entry_id: Set(device.queue_timeout_active_entry_id),
      queue_timeout_deadline_at: Set(device.queue_timeout_deadline_at.map(Into::into)),
      queue_timeout_extended_count: Set(device.queue_timeout_extended_count),
      queue_timeout_reminded_at: Set(device.queue_timeout_reminded_at.map(Into::into)),
      created_at: Set(device.created_at.into()),
    }
  }

  fn entry_active(entry: &QueueEntry) -> queue_entries::ActiveModel {
    queue_entries::ActiveModel {
      id: Set(entry.id),
      device_id: Set(entry.device_id),
      inspector_name: Set(entry.inspector_name.clone()),
      created_by_id: Set(entry.created_by_id.clone()),
      position: Set(entry.position),
      version: Set(entry.version),
      submitted_at: Set(entry.submitted_at.into()),
    }
  }
}

#[async_trait]
impl Store for PostgresStore {
  async fn insert_device(&self, device: NewDevice) -> Result<Device> {
    let existing = Devices::find()
      .filter(devices::Column::DeviceCode.eq(&device.device_code))
      .one(&self.db)
      .await?;
    if existing.is_some() {
      return Err(Error::device_exists(device.device_code));
    }

    let model = devices::ActiveModel {
      device_code: Set(device.device_code),
      name: Set(device.name),
      model: Set(device.model),
      location: Set(device.location),
      status: Set(devices::DeviceState::Offline),
      last_heartbeat_at: Set(None),
      manual_status: Set(None),
      manual_status_expires_at: Set(None),
      task_id: Set(None),
      task_name: Set(None),
      task_progress: Set(0),
      task_started_at: Set(None),
      metrics: Set(None),
      queue_timeout_active_entry_id: Set(None),
      queue_timeout_deadline_at: Set(None),
      queue_timeout_extended_count: Set(0),
      queue_timeout_reminded_at: Set(None),
      created_at: Set(device.created_at.into()),
      ..Default::default()
    };
    let inserted = model.insert(&self.db).await?;
    Ok(inserted.into())
  }

  async fn device(&self, device_id: i64) -> Result<Option<Device>> {
    let model = Devices::find_by_id(device_id).one(&self.db).await?;
    Ok(model.map(Into::into))
  }

  async fn device_by_code(&self, code: &str) -> Result<Option<Device>> {
    let model = Devices::find()
      .filter(devices::Column::DeviceCode.eq(code))
      .one(&self.db)
      .await?;
    Ok(model.map(Into::into))
  }

  async fn devices(&self) -> Result<Vec<Device>> {
    let models = Devices::find()
      .order_by_asc(devices::Column::Id)
      .all(&self.db)
      .await?;
    Ok(models.into_iter().map(Into::into).collect())
  }

  async fn save_device(&self, device: &Device) -> Result<()> {
    match Self::device_active(device).update(&self.db).await {
      Ok(_) => Ok(()),
      Err(DbErr::RecordNotUpdated) => Err(Error::device_not_found(device.id)),
      Err(e) => Err(e.into()),
    }
  }

  async fn delete_device(&self, device_id: i64) -> Result<bool> {
    QueueEntries::delete_many()
      .filter(queue_entries::Column::DeviceId.eq(device_id))
      .exec(&self.db)
      .await?;
    let result = Devices::delete_by_id(device_id).exec(&self.db).await?;
    Ok(result.rows_affected > 0)
  }

  async fn insert_entries(&self, entries: Vec<NewQueueEntry>) -> Result<Vec<QueueEntry>> {
    let mut created = Vec::with_capacity(entries.len());
    for entry in entries {
      let model = queue_entries::ActiveModel {
        device_id: Set(entry.device_id),
        inspector_name: Set(entry.inspector_name),
        created_by_id: Set(entry.created_by_id),
        position: Set(entry.position),
        version: Set(0),
        submitted_at: Set(entry.submitted_at.into()),
        ..Default::default()
      };
      let inserted = model.insert(&self.db).await?;
      created.push(inserted.into());
    }
    Ok(created)
  }

  async fn entry(&self, entry_id: i64) -> Result<Option<QueueEntry>> {
    let model = QueueEntries::find_by_id(entry_id).one(&self.db).await?;
    Ok(model.map(Into::into))
  }

  async fn entries_for_device(&self, device_id: i64) -> Result<Vec<QueueEntry>> {
    let models = QueueEntries::find()
      .filter(queue_entries::Column::DeviceId.eq(device_id))
      .order_by_asc(queue_entries::Column::Position)
      .all(&self.db)
      .await?;
    Ok(models.into_iter().map(Into::into).collect())
  }

  async fn save_entries(&self, entries: &[QueueEntry]) -> Result<()> {
    for entry in entries {
      match Self::entry_active(entry).update(&self.db).await {
        Ok(_) => {}
        Err(DbErr::RecordNotUpdated) => {
          return Err(Error::EntryNotFound { entry_id: entry.id });
        }
        Err(e) => return Err(e.into()),
      }
    }
    Ok(())
  }

  async fn remove_entry(&self, entry_id: i64) -> Result<bool> {
    let result = QueueEntries::delete_by_id(entry_id).exec(&self.db).await?;
    Ok(result.rows_affected > 0)
  }

  async fn queue_count(&self, device_id: i64) -> Result<usize> {
    let count = QueueEntries::find()
      .filter(queue_entries::Column::DeviceId.eq(device_id))
      .count(&self.db)
      .await?;
    Ok(count as usize)
  }

  async fn append_log(&self, log: NewQueueLog) -> Result<QueueLog> {
    let model = queue_logs::ActiveModel {
      device_id: Set(log.device_id),
      old_position: Set(log.old_position),
      new_position: Set(log.new_position),
      change_type: Set(log.change_type.into()),
      changed_by: Set(log.changed_by),
      changed_by_id: Set(log.changed_by_id),
      change_time: Set(log.change_time.into()),
      remark: Set(log.remark),
      ..Default::default()
    };
    let inserted = model.insert(&self.db).await?;
    Ok(inserted.into())
  }

  async fn logs_for_day(
    &self,
    device_id: i64,
    day: NaiveDate,
    limit: usize,
  ) -> Result<Vec<QueueLog>> {
    let start = DateTime::<Utc>::from_naive_utc_and_offset(day.and_time(NaiveTime::MIN), Utc);
    let end = start + chrono::Duration::days(1);
    let models = QueueLogs::find()
      .filter(queue_logs::Column::DeviceId.eq(device_id))
      .filter(queue_logs::Column::ChangeTime.gte(start))
      .filter(queue_logs::Column::ChangeTime.lt(end))
      .order_by_desc(queue_logs::Column::ChangeTime)
      .order_by_desc(queue_logs::Column::Id)
      .limit(limit as u64)
      .all(&self.db)
      .await?;
    Ok(models.into_iter().map(Into::into).collect())
  }
}
