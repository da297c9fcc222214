use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Kitchen/service lifecycle of an order.
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
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "preparing")]
    Preparing,
    #[sea_orm(string_value = "ready")]
    Ready,
    #[sea_orm(string_value = "served")]
    Served,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// The single forward step the kitchen may take from here.
    fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Confirmed),
            Self::Confirmed => Some(Self::Preparing),
            Self::Preparing => Some(Self::Ready),
            Self::Ready => Some(Self::Served),
            Self::Served => Some(Self::Completed),
            Self::Completed | Self::Cancelled => None,
        }
    }

    /// Adjacent forward steps only; cancellation from any non-terminal state.
    pub fn can_transition_to(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Cancelled || self.next() == Some(to)
    }

    pub fn transition_to(self, to: Self) -> Result<Self, ServiceError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(ServiceError::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

/// Per-line kitchen progress, tracked independently of the order.
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
pub enum OrderItemStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "preparing")]
    Preparing,
    #[sea_orm(string_value = "ready")]
    Ready,
    #[sea_orm(string_value = "served")]
    Served,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderItemStatus {
    /// A served line can still be voided, so only cancellation is final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled)
    }

    fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Preparing),
            Self::Preparing => Some(Self::Ready),
            Self::Ready => Some(Self::Served),
            Self::Served | Self::Cancelled => None,
        }
    }

    pub fn can_transition_to(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Cancelled || self.next() == Some(to)
    }

    pub fn transition_to(self, to: Self) -> Result<Self, ServiceError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(ServiceError::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}
