//! Narrow persistence capabilities per aggregate. Every method that must be
//! atomic runs in its own transaction inside the store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::{customer_session, order, order_item, payment};
use crate::errors::ServiceError;
use crate::gateway::GatewayFact;
use crate::models::{OrderItemStatus, OrderStatus, PaymentStatus, ReconcileOutcome};
use crate::services::pricing::PricedCart;

pub mod order_store;
pub mod payment_store;

pub use order_store::SeaOrmOrderStore;
pub use payment_store::SeaOrmPaymentStore;

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

#[derive(Clone, Debug)]
pub struct NewOrder {
    pub session_id: Uuid,
    pub notes: Option<String>,
    pub cart: PricedCart,
}

#[derive(Clone, Debug)]
pub struct PlacedOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub table_number: String,
}

#[derive(Clone, Debug)]
pub struct OrderStatusChange {
    pub order: order::Model,
    pub previous: OrderStatus,
}

#[derive(Clone, Debug)]
pub struct ItemStatusChange {
    pub item: order_item::Model,
    pub order: order::Model,
    pub previous: OrderItemStatus,
}

/// Staff listing filter.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub table_id: Option<Uuid>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl OrderFilter {
    /// One-based page number
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u64 {
        self.per_page.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

/// Staff payment history filter. Dates are calendar days in UTC and both
/// ends are inclusive.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PaymentFilter {
    pub transaction_status: Option<String>,
    pub order_id: Option<Uuid>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PaymentFilter {
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u64 {
        self.per_page.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn created_from(&self) -> Option<DateTime<Utc>> {
        self.date_from
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .map(|start| start.and_utc())
    }

    /// Exclusive upper bound: midnight after `date_to`.
    pub fn created_before(&self) -> Option<DateTime<Utc>> {
        self.date_to
            .and_then(|day| day.succ_opt())
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .map(|end| end.and_utc())
    }
}

#[derive(Clone, Debug)]
pub struct NewPaymentAttempt {
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub gross_amount: Decimal,
    pub currency: String,
    pub snap_token: String,
    pub redirect_url: String,
}

/// Result of applying one gateway fact.
#[derive(Clone, Debug)]
pub struct Reconciliation {
    pub outcome: ReconcileOutcome,
    pub order: order::Model,
    pub payment: payment::Model,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists the order, its items, stock decrements, inventory log, table
    /// flip and staff notification as one unit.
    async fn create_order(&self, new_order: NewOrder) -> Result<PlacedOrder, ServiceError>;

    async fn find_order(&self, order_id: Uuid) -> Result<Option<order::Model>, ServiceError>;

    async fn find_items(&self, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError>;

    /// Session that placed an order; ended sessions are returned too.
    async fn find_session(&self, session_id: Uuid) -> Result<Option<customer_session::Model>, ServiceError>;

    async fn update_order_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<OrderStatusChange, ServiceError>;

    async fn update_item_status(
        &self,
        item_id: Uuid,
        next: OrderItemStatus,
    ) -> Result<ItemStatusChange, ServiceError>;

    async fn list_session_orders(&self, session_id: Uuid) -> Result<Vec<order::Model>, ServiceError>;

    async fn list_orders(&self, filter: &OrderFilter) -> Result<(Vec<order::Model>, u64), ServiceError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn latest_attempt(&self, order_id: Uuid) -> Result<Option<payment::Model>, ServiceError>;

    async fn count_attempts(&self, order_id: Uuid) -> Result<u64, ServiceError>;

    /// Re-checks the payment guard under the order lock before inserting.
    async fn record_attempt(&self, attempt: NewPaymentAttempt) -> Result<payment::Model, ServiceError>;

    /// Merges a gateway fact into the payment and its order.
    async fn apply_fact(&self, fact: &GatewayFact) -> Result<Reconciliation, ServiceError>;

    /// Attempts newest first, with the total matching the filter.
    async fn list_attempts(&self, filter: &PaymentFilter) -> Result<(Vec<payment::Model>, u64), ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_filter_spans_whole_days() {
        let filter = PaymentFilter {
            date_from: NaiveDate::from_ymd_opt(2024, 5, 1),
            date_to: NaiveDate::from_ymd_opt(2024, 5, 31),
            ..Default::default()
        };
        assert_eq!(
            filter.created_from().map(|t| t.to_rfc3339()).as_deref(),
            Some("2024-05-01T00:00:00+00:00")
        );
        assert_eq!(
            filter.created_before().map(|t| t.to_rfc3339()).as_deref(),
            Some("2024-06-01T00:00:00+00:00")
        );
    }

    #[test]
    fn payment_filter_pages_are_clamped() {
        let filter = PaymentFilter {
            page: Some(0),
            per_page: Some(10_000),
            ..Default::default()
        };
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.per_page(), MAX_PAGE_SIZE);
        assert_eq!(PaymentFilter::default().per_page(), DEFAULT_PAGE_SIZE);
    }
}
