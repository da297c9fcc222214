use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::NotificationKind;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub table_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub message: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    /// Unread notification created in the same flow as its event
    pub fn unread(
        kind: NotificationKind,
        message: String,
        order_id: Option<Uuid>,
        table_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: sea_orm::Set(Uuid::new_v4()),
            order_id: sea_orm::Set(order_id),
            table_id: sea_orm::Set(table_id),
            kind: sea_orm::Set(kind),
            message: sea_orm::Set(message),
            is_read: sea_orm::Set(false),
            read_at: sea_orm::Set(None),
            created_at: sea_orm::Set(Utc::now()),
        }
    }
}
