//! 队列日志实体
//! Queue log entity

use crate::queue::{ChangeType, QueueLog};
use sea_orm::entity::prelude::*;

/// 变更类型列枚举
/// Change type column enum
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum QueueChange {
  #[sea_orm(string_value = "manual_move")]
  ManualMove,
  #[sea_orm(string_value = "join")]
  Join,
  #[sea_orm(string_value = "leave")]
  Leave,
  #[sea_orm(string_value = "complete")]
  Complete,
  #[sea_orm(string_value = "timeout_shift")]
  TimeoutShift,
  #[sea_orm(string_value = "timeout_extend")]
  TimeoutExtend,
}

impl From<ChangeType> for QueueChange {
  fn from(change: ChangeType) -> Self {
    match change {
      ChangeType::ManualMove => QueueChange::ManualMove,
      ChangeType::Join => QueueChange::Join,
      ChangeType::Leave => QueueChange::Leave,
      ChangeType::Complete => QueueChange::Complete,
      ChangeType::TimeoutShift => QueueChange::TimeoutShift,
      ChangeType::TimeoutExtend => QueueChange::TimeoutExtend,
    }
  }
}

impl From<QueueChange> for ChangeType {
  fn from(change: QueueChange) -> Self {
    match change {
      QueueChange::ManualMove => ChangeType::ManualMove,
      QueueChange::Join => ChangeType::Join,
      QueueChange::Leave => ChangeType::Leave,
      QueueChange::Complete => ChangeType::Complete,
      QueueChange::TimeoutShift => ChangeType::TimeoutShift,
      QueueChange::TimeoutExtend => ChangeType::TimeoutExtend,
    }
  }
}

/// 队列日志实体模型
/// Queue log entity model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "loomq_queue_logs")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub device_id: i64,
  pub old_position: Option<i32>,
  pub new_position: i32,
  pub change_type: QueueChange,
  pub changed_by: String,
  pub changed_by_id: String,
  pub change_time: DateTimeWithTimeZone,
  pub remark: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for QueueLog {
  fn from(model: Model) -> Self {
    QueueLog {
      id: model.id,
      device_id: model.device_id,
      old_position: model.old_position,
      new_position: model.new_position,
      change_type: model.change_type.into(),
      changed_by: model.changed_by,
      changed_by_id: model.changed_by_id,
      change_time: model.change_time.into(),
      remark: model.remark,
    }
  }
}
