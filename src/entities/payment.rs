use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::PaymentStatus;

/// One payment attempt for an order, updated in place by reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    /// External order id sent to the gateway
    #[sea_orm(unique)]
    pub gateway_order_id: String,
    pub transaction_id: Option<String>,
    pub payment_type: Option<String>,
    /// Gateway vocabulary (pending, settlement, capture, deny, ...)
    pub transaction_status: String,
    pub transaction_time: Option<DateTime<Utc>>,
    pub gross_amount: Decimal,
    pub currency: String,
    pub va_number: Option<String>,
    pub bank: Option<String>,
    pub fraud_status: Option<String>,
    pub status_message: Option<String>,
    pub snap_token: Option<String>,
    pub redirect_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub raw_payload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Where this attempt sits on the payment axis. A stored but unmapped
    /// gateway status still counts as in flight.
    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::from_gateway(&self.transaction_status).unwrap_or(PaymentStatus::Pending)
    }
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
