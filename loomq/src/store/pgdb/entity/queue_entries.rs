//! 队列条目实体
//! Queue entry entity

use crate::queue::QueueEntry;
use sea_orm::entity::prelude::*;

/// 队列条目实体模型
/// Queue entry entity model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "loomq_queue_entries")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub device_id: i64,
  pub inspector_name: String,
  pub created_by_id: String,
  pub position: i32,
  pub version: i64,
  pub submitted_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for QueueEntry {
  fn from(model: Model) -> Self {
    QueueEntry {
      id: model.id,
      device_id: model.device_id,
      inspector_name: model.inspector_name,
      created_by_id: model.created_by_id,
      position: model.position,
      version: model.version,
      submitted_at: model.submitted_at.into(),
    }
  }
}
