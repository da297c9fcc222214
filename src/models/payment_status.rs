use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment axis of an order, independent from the kitchen status.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentStatus {
    #[sea_orm(string_value = "unpaid")]
    Unpaid,
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl PaymentStatus {
    /// Maps a gateway transaction status onto the payment axis.
    /// Unknown strings map to `None` and never move the order.
    pub fn from_gateway(transaction_status: &str) -> Option<Self> {
        match transaction_status.trim().to_ascii_lowercase().as_str() {
            "capture" | "settlement" => Some(Self::Paid),
            "pending" => Some(Self::Pending),
            "deny" | "cancel" | "expire" | "failure" => Some(Self::Failed),
            "refund" | "partial_refund" => Some(Self::Refunded),
            _ => None,
        }
    }

    /// Finality rank: unpaid < pending < paid. Failed and refunded are terminal.
    pub fn rank(self) -> u8 {
        match self {
            Self::Unpaid => 0,
            Self::Pending => 1,
            Self::Paid => 2,
            Self::Failed | Self::Refunded => 3,
        }
    }

    /// No further gateway fact may move a payment out of these.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Refunded)
    }

    /// True when moving to `next` is progress rather than a stale replay.
    pub fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Unpaid, Self::Pending | Self::Paid | Self::Failed) => true,
            (Self::Pending, Self::Paid | Self::Failed) => true,
            (Self::Paid, Self::Refunded) => true,
            _ => false,
        }
    }

    /// An attempt in one of these states blocks a new CreatePayment.
    pub fn blocks_new_attempt(self) -> bool {
        matches!(self, Self::Pending | Self::Paid)
    }
}
