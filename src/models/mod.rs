pub mod order_status;
pub mod payment_status;
pub mod reconciliation;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub use order_status::{OrderItemStatus, OrderStatus};
pub use payment_status::PaymentStatus;
pub use reconciliation::{classify, ReconcileOutcome};

/// Physical seat availability.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TableStatus {
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "occupied")]
    Occupied,
    #[sea_orm(string_value = "reserved")]
    Reserved,
}

/// What a persisted staff notification is about.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    #[sea_orm(string_value = "new_order")]
    NewOrder,
    #[sea_orm(string_value = "payment_received")]
    PaymentReceived,
    #[sea_orm(string_value = "order_ready")]
    OrderReady,
    #[sea_orm(string_value = "assistance_request")]
    AssistanceRequest,
}
