use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{OrderStatus, PaymentStatus};

/// Order aggregate root. Monetary fields are frozen at creation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub session_id: Uuid,
    pub table_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: Decimal,
    pub tax_amount: Decimal,
    pub service_charge: Decimal,
    pub grand_total: Decimal,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Guard for a new payment attempt given the latest existing attempt.
    pub fn ensure_payable(
        &self,
        latest_attempt: Option<&super::payment::Model>,
    ) -> Result<(), ServiceError> {
        match self.payment_status {
            PaymentStatus::Paid | PaymentStatus::Refunded => {
                return Err(ServiceError::AlreadyPaid(self.order_number.clone()))
            }
            _ if self.status == OrderStatus::Cancelled => {
                return Err(ServiceError::InvalidOperation(format!(
                    "order {} is cancelled",
                    self.order_number
                )))
            }
            _ => {}
        }

        match latest_attempt {
            Some(attempt) if !attempt.payment_status().is_terminal() => {
                Err(ServiceError::PaymentInProgress(self.order_number.clone()))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payment,
    #[sea_orm(
        belongs_to = "super::customer_session::Entity",
        from = "Column::SessionId",
        to = "super::customer_session::Column::Id"
    )]
    CustomerSession,
    #[sea_orm(
        belongs_to = "super::dining_table::Entity",
        from = "Column::TableId",
        to = "super::dining_table::Column::Id"
    )]
    Table,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl Related<super::customer_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CustomerSession.def()
    }
}

impl Related<super::dining_table::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Table.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert && matches!(active_model.created_at, ActiveValue::NotSet) {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}
