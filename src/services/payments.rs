use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::Caller,
    entities::{order, order_item, payment},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{PaymentGateway, TransactionItem, TransactionRequest},
    models::{PaymentStatus, ReconcileOutcome},
    repositories::{NewPaymentAttempt, OrderStore, PaymentFilter, PaymentStore},
    services::{orders::ensure_visible, pricing::MenuCatalog, reconciler::PaymentReconciler},
    PaginatedResponse,
};

const DEFAULT_CUSTOMER_NAME: &str = "Guest";
const FALLBACK_ITEM_NAME: &str = "Menu item";

/// Everything the customer needs to open the gateway's checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiated {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub snap_token: String,
    pub redirect_url: String,
    pub gross_amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub payment_status: PaymentStatus,
    pub transaction_status: String,
    pub payment_type: Option<String>,
    #[serde(flatten)]
    pub outcome: ReconcileOutcome,
}

/// First attempt reuses the order number; retries get a numeric suffix so
/// every attempt stays unique at the gateway.
pub fn gateway_order_id(order_number: &str, previous_attempts: u64) -> String {
    if previous_attempts == 0 {
        order_number.to_string()
    } else {
        format!("{}-{}", order_number, previous_attempts + 1)
    }
}

/// Payment initiation and on-demand status checks
#[derive(Clone)]
pub struct PaymentService {
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentStore>,
    catalog: Arc<dyn MenuCatalog>,
    gateway: Arc<dyn PaymentGateway>,
    reconciler: PaymentReconciler,
    event_sender: Option<Arc<EventSender>>,
    currency: String,
    expiry_minutes: u32,
}

impl PaymentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentStore>,
        catalog: Arc<dyn MenuCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        reconciler: PaymentReconciler,
        event_sender: Option<Arc<EventSender>>,
        currency: String,
        expiry_minutes: u32,
    ) -> Self {
        Self {
            orders,
            payments,
            catalog,
            gateway,
            reconciler,
            event_sender,
            currency,
            expiry_minutes,
        }
    }

    async fn load_order(&self, order_id: Uuid, caller: &Caller) -> Result<order::Model, ServiceError> {
        let order = self
            .orders
            .find_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;
        ensure_visible(&order, caller)?;
        Ok(order)
    }

    async fn transaction_items(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<Vec<TransactionItem>, ServiceError> {
        let mut lines = Vec::with_capacity(items.len() + 2);
        for item in items {
            let name = self
                .catalog
                .get_menu_item(item.menu_item_id)
                .await?
                .map(|menu_item| menu_item.name)
                .unwrap_or_else(|| FALLBACK_ITEM_NAME.to_string());
            lines.push(TransactionItem {
                id: item.menu_item_id.to_string(),
                name,
                price: item.unit_price,
                quantity: item.quantity,
            });
        }

        // The gateway checks that item lines add up to the gross amount.
        if order.tax_amount > Decimal::ZERO {
            lines.push(TransactionItem {
                id: "TAX".to_string(),
                name: "Tax".to_string(),
                price: order.tax_amount,
                quantity: 1,
            });
        }
        if order.service_charge > Decimal::ZERO {
            lines.push(TransactionItem {
                id: "SERVICE".to_string(),
                name: "Service Charge".to_string(),
                price: order.service_charge,
                quantity: 1,
            });
        }
        Ok(lines)
    }

    /// Opens a gateway transaction for the order's grand total.
    ///
    /// The gateway call runs outside any database transaction; the attempt
    /// is recorded afterwards under the order lock, which re-checks that no
    /// other attempt slipped in meanwhile.
    #[instrument(skip(self, caller))]
    pub async fn create_payment(&self, order_id: Uuid, caller: &Caller) -> Result<PaymentInitiated, ServiceError> {
        let order = self.load_order(order_id, caller).await?;

        let latest = self.payments.latest_attempt(order.id).await?;
        order.ensure_payable(latest.as_ref()).map_err(|e| {
            warn!(order_number = %order.order_number, error = %e, "Payment refused");
            e
        })?;

        let attempts = self.payments.count_attempts(order.id).await?;
        let gateway_order_id = gateway_order_id(&order.order_number, attempts);

        let items = self.orders.find_items(order.id).await?;
        let session = self.orders.find_session(order.session_id).await?;
        let (customer_name, customer_phone) = match session {
            Some(session) => (
                session
                    .customer_name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string()),
                session.customer_phone,
            ),
            None => (DEFAULT_CUSTOMER_NAME.to_string(), None),
        };

        let request = TransactionRequest {
            gateway_order_id: gateway_order_id.clone(),
            gross_amount: order.grand_total,
            items: self.transaction_items(&order, &items).await?,
            customer_name,
            customer_phone,
            expiry_minutes: self.expiry_minutes,
        };

        let token = self.gateway.create_transaction(&request).await?;

        let payment = self
            .payments
            .record_attempt(NewPaymentAttempt {
                order_id: order.id,
                gateway_order_id: gateway_order_id.clone(),
                gross_amount: order.grand_total,
                currency: self.currency.clone(),
                snap_token: token.token.clone(),
                redirect_url: token.redirect_url.clone(),
            })
            .await?;

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::PaymentStatusUpdated {
                order_id: order.id,
                order_number: order.order_number.clone(),
                table_id: order.table_id,
                payment_status: PaymentStatus::Pending,
            }) {
                warn!(error = %e, "Failed to publish payment event");
            }
        }

        info!(order_number = %order.order_number, %gateway_order_id, "Payment initiated");
        Ok(PaymentInitiated {
            payment_id: payment.id,
            order_id: order.id,
            gateway_order_id,
            snap_token: token.token,
            redirect_url: token.redirect_url,
            gross_amount: payment.gross_amount,
            currency: payment.currency,
        })
    }

    /// Pulls the latest attempt's status from the gateway and reconciles it.
    #[instrument(skip(self, caller))]
    pub async fn check_payment_status(
        &self,
        order_id: Uuid,
        caller: &Caller,
    ) -> Result<PaymentStatusResponse, ServiceError> {
        let order = self.load_order(order_id, caller).await?;
        let latest = self
            .payments
            .latest_attempt(order.id)
            .await?
            .ok_or_else(|| ServiceError::PaymentNotFound(order.order_number.clone()))?;

        let fact = self.gateway.get_transaction_status(&latest.gateway_order_id).await?;
        let reconciliation = self.reconciler.apply(&fact).await?;

        Ok(PaymentStatusResponse {
            order_id: reconciliation.order.id,
            order_number: reconciliation.order.order_number,
            payment_status: reconciliation.order.payment_status,
            transaction_status: reconciliation.payment.transaction_status,
            payment_type: reconciliation.payment.payment_type,
            outcome: reconciliation.outcome,
        })
    }

    /// Staff view of every attempt, newest first.
    #[instrument(skip(self))]
    pub async fn list_payments(
        &self,
        filter: PaymentFilter,
    ) -> Result<PaginatedResponse<payment::Model>, ServiceError> {
        if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
            if from > to {
                return Err(ServiceError::InvalidInput(format!(
                    "date_from {} is after date_to {}",
                    from, to
                )));
            }
        }
        let (payments, total) = self.payments.list_attempts(&filter).await?;
        Ok(PaginatedResponse::new(payments, total, filter.page(), filter.per_page()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{customer_session, payment};
    use crate::gateway::{MockPaymentGateway, TransactionToken};
    use crate::models::{OrderItemStatus, OrderStatus};
    use crate::repositories::{MockOrderStore, MockPaymentStore};
    use crate::services::pricing::MockMenuCatalog;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn session() -> customer_session::Model {
        customer_session::Model {
            id: Uuid::new_v4(),
            table_id: Uuid::new_v4(),
            session_token: "token".into(),
            customer_name: Some("Budi".into()),
            customer_phone: Some("0812".into()),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    fn order_for(session: &customer_session::Model, payment_status: PaymentStatus) -> order::Model {
        order::Model {
            id: Uuid::new_v4(),
            order_number: "ORD-20240101-00001".into(),
            session_id: session.id,
            table_id: session.table_id,
            status: OrderStatus::Pending,
            payment_status,
            total_amount: dec!(100000),
            tax_amount: dec!(10000),
            service_charge: dec!(5000),
            grand_total: dec!(115000),
            payment_method: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item_of(order: &order::Model) -> order_item::Model {
        order_item::Model {
            id: Uuid::new_v4(),
            order_id: order.id,
            menu_item_id: Uuid::new_v4(),
            quantity: 2,
            unit_price: dec!(50000),
            subtotal: dec!(100000),
            notes: None,
            status: OrderItemStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn pending_attempt(order: &order::Model) -> payment::Model {
        payment::Model {
            id: Uuid::new_v4(),
            order_id: order.id,
            gateway_order_id: order.order_number.clone(),
            transaction_id: None,
            payment_type: None,
            transaction_status: "pending".into(),
            transaction_time: None,
            gross_amount: order.grand_total,
            currency: "IDR".into(),
            va_number: None,
            bank: None,
            fraud_status: None,
            status_message: None,
            snap_token: Some("snap".into()),
            redirect_url: None,
            raw_payload: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn orders_returning(session: &customer_session::Model, order: &order::Model) -> MockOrderStore {
        let mut orders = MockOrderStore::new();
        let found = order.clone();
        orders
            .expect_find_order()
            .returning(move |_| Ok(Some(found.clone())));
        let item = item_of(order);
        orders
            .expect_find_items()
            .returning(move |_| Ok(vec![item.clone()]));
        let owner = session.clone();
        orders
            .expect_find_session()
            .returning(move |_| Ok(Some(owner.clone())));
        orders
    }

    fn service(
        orders: MockOrderStore,
        payments: MockPaymentStore,
        gateway: MockPaymentGateway,
    ) -> PaymentService {
        let payments: Arc<dyn PaymentStore> = Arc::new(payments);
        let gateway: Arc<dyn PaymentGateway> = Arc::new(gateway);
        let mut catalog = MockMenuCatalog::new();
        catalog.expect_get_menu_item().returning(|_| Ok(None));
        PaymentService::new(
            Arc::new(orders),
            payments.clone(),
            Arc::new(catalog),
            gateway.clone(),
            PaymentReconciler::new(payments, gateway, None),
            None,
            "IDR".into(),
            60,
        )
    }

    #[test]
    fn retries_get_numbered_gateway_ids() {
        assert_eq!(gateway_order_id("ORD-20240101-00001", 0), "ORD-20240101-00001");
        assert_eq!(gateway_order_id("ORD-20240101-00001", 1), "ORD-20240101-00001-2");
    }

    #[tokio::test]
    async fn gateway_request_lines_add_up_to_grand_total() {
        let session = session();
        let order = order_for(&session, PaymentStatus::Unpaid);
        let mut payments = MockPaymentStore::new();
        payments.expect_latest_attempt().returning(|_| Ok(None));
        payments.expect_count_attempts().returning(|_| Ok(0));
        let recorded = pending_attempt(&order);
        payments
            .expect_record_attempt()
            .times(1)
            .returning(move |_| Ok(recorded.clone()));

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_transaction()
            .withf(|request| {
                let sum: Decimal = request
                    .items
                    .iter()
                    .map(|item| item.price * Decimal::from(item.quantity))
                    .sum();
                sum == request.gross_amount && request.customer_name == "Budi"
            })
            .times(1)
            .returning(|_| {
                Ok(TransactionToken {
                    token: "snap-token".into(),
                    redirect_url: "https://pay.example/snap".into(),
                })
            });

        let svc = service(orders_returning(&session, &order), payments, gateway);
        let initiated = svc
            .create_payment(order.id, &Caller::Customer(session))
            .await
            .unwrap();

        assert_eq!(initiated.snap_token, "snap-token");
        assert_eq!(initiated.gross_amount, dec!(115000));
        assert_eq!(initiated.gateway_order_id, "ORD-20240101-00001");
    }

    #[tokio::test]
    async fn gateway_failure_records_nothing() {
        let session = session();
        let order = order_for(&session, PaymentStatus::Unpaid);
        let mut payments = MockPaymentStore::new();
        payments.expect_latest_attempt().returning(|_| Ok(None));
        payments.expect_count_attempts().returning(|_| Ok(0));
        payments.expect_record_attempt().never();

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_transaction()
            .returning(|_| Err(ServiceError::PaymentGatewayError("timed out".into())));

        let svc = service(orders_returning(&session, &order), payments, gateway);
        let err = svc
            .create_payment(order.id, &Caller::Customer(session))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::PaymentGatewayError(_));
    }

    #[tokio::test]
    async fn in_flight_attempt_blocks_second_charge() {
        let session = session();
        let order = order_for(&session, PaymentStatus::Pending);
        let attempt = pending_attempt(&order);
        let mut payments = MockPaymentStore::new();
        payments
            .expect_latest_attempt()
            .returning(move |_| Ok(Some(attempt.clone())));
        payments.expect_record_attempt().never();
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_transaction().never();

        let svc = service(orders_returning(&session, &order), payments, gateway);
        let err = svc
            .create_payment(order.id, &Caller::Customer(session))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::PaymentInProgress(_));
    }

    #[tokio::test]
    async fn paid_order_is_refused() {
        let session = session();
        let order = order_for(&session, PaymentStatus::Paid);
        let mut payments = MockPaymentStore::new();
        payments.expect_latest_attempt().returning(|_| Ok(None));
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_transaction().never();

        let svc = service(orders_returning(&session, &order), payments, gateway);
        let err = svc
            .create_payment(order.id, &Caller::Customer(session))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::AlreadyPaid(_));
    }

    #[tokio::test]
    async fn status_check_without_attempt_is_not_found() {
        let session = session();
        let order = order_for(&session, PaymentStatus::Unpaid);
        let mut payments = MockPaymentStore::new();
        payments.expect_latest_attempt().returning(|_| Ok(None));
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_get_transaction_status().never();

        let svc = service(orders_returning(&session, &order), payments, gateway);
        let err = svc
            .check_payment_status(order.id, &Caller::Customer(session))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::PaymentNotFound(_));
    }

    #[tokio::test]
    async fn payment_listing_rejects_inverted_date_range() {
        let payments = MockPaymentStore::new();
        let svc = service(MockOrderStore::new(), payments, MockPaymentGateway::new());
        let err = svc
            .list_payments(PaymentFilter {
                date_from: chrono::NaiveDate::from_ymd_opt(2024, 5, 2),
                date_to: chrono::NaiveDate::from_ymd_opt(2024, 5, 1),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidInput(_));
    }

    #[tokio::test]
    async fn payment_listing_pages_store_results() {
        let session = session();
        let order = order_for(&session, PaymentStatus::Pending);
        let attempt = pending_attempt(&order);
        let mut payments = MockPaymentStore::new();
        payments
            .expect_list_attempts()
            .withf(|filter| filter.transaction_status.as_deref() == Some("pending"))
            .times(1)
            .returning(move |_| Ok((vec![attempt.clone()], 21)));

        let svc = service(MockOrderStore::new(), payments, MockPaymentGateway::new());
        let page = svc
            .list_payments(PaymentFilter {
                transaction_status: Some("pending".into()),
                page: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total, 21);
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 2);
    }
}
