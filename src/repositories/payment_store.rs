use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{NewPaymentAttempt, PaymentFilter, PaymentStore, Reconciliation};
use crate::db::DbPool;
use crate::entities::{notification, order, payment};
use crate::errors::ServiceError;
use crate::events::payment_received_message;
use crate::gateway::GatewayFact;
use crate::models::{classify, NotificationKind, PaymentStatus, ReconcileOutcome};

fn db_error(context: &'static str) -> impl Fn(DbErr) -> ServiceError {
    move |e| {
        error!(error = %e, "{}", context);
        ServiceError::DatabaseError(e)
    }
}

async fn latest_attempt_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Option<payment::Model>, DbErr> {
    payment::Entity::find()
        .filter(payment::Column::OrderId.eq(order_id))
        .order_by_desc(payment::Column::CreatedAt)
        .one(conn)
        .await
}

#[derive(Clone)]
pub struct SeaOrmPaymentStore {
    db_pool: Arc<DbPool>,
}

impl SeaOrmPaymentStore {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PaymentStore for SeaOrmPaymentStore {
    async fn latest_attempt(&self, order_id: Uuid) -> Result<Option<payment::Model>, ServiceError> {
        latest_attempt_in(&*self.db_pool, order_id)
            .await
            .map_err(db_error("Failed to load latest payment attempt"))
    }

    async fn count_attempts(&self, order_id: Uuid) -> Result<u64, ServiceError> {
        payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .count(&*self.db_pool)
            .await
            .map_err(db_error("Failed to count payment attempts"))
    }

    #[instrument(skip(self, attempt), fields(order_id = %attempt.order_id, gateway_order_id = %attempt.gateway_order_id))]
    async fn record_attempt(&self, attempt: NewPaymentAttempt) -> Result<payment::Model, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for payment attempt");
            ServiceError::DatabaseError(e)
        })?;

        let current = order::Entity::find_by_id(attempt.order_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_error("Failed to load order"))?
            .ok_or_else(|| ServiceError::OrderNotFound(attempt.order_id.to_string()))?;

        let latest = latest_attempt_in(&txn, current.id)
            .await
            .map_err(db_error("Failed to load latest payment attempt"))?;
        current.ensure_payable(latest.as_ref())?;

        let now = Utc::now();
        let inserted = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(current.id),
            gateway_order_id: Set(attempt.gateway_order_id.clone()),
            transaction_id: Set(None),
            payment_type: Set(None),
            transaction_status: Set("pending".to_string()),
            transaction_time: Set(None),
            gross_amount: Set(attempt.gross_amount),
            currency: Set(attempt.currency),
            va_number: Set(None),
            bank: Set(None),
            fraud_status: Set(None),
            status_message: Set(None),
            snap_token: Set(Some(attempt.snap_token)),
            redirect_url: Set(Some(attempt.redirect_url)),
            raw_payload: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                warn!(gateway_order_id = %attempt.gateway_order_id, "Lost race recording payment attempt");
                ServiceError::PaymentInProgress(current.order_number.clone())
            }
            _ => {
                error!(error = %e, "Failed to insert payment attempt");
                ServiceError::DatabaseError(e)
            }
        })?;

        let order_number = current.order_number.clone();
        let mut active: order::ActiveModel = current.into();
        active.payment_status = Set(PaymentStatus::Pending);
        active
            .update(&txn)
            .await
            .map_err(db_error("Failed to mark order payment pending"))?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit payment attempt");
            ServiceError::DatabaseError(e)
        })?;

        info!(%order_number, payment_id = %inserted.id, "Payment attempt recorded");
        Ok(inserted)
    }

    #[instrument(skip(self, fact), fields(gateway_order_id = %fact.gateway_order_id, transaction_status = %fact.transaction_status))]
    async fn apply_fact(&self, fact: &GatewayFact) -> Result<Reconciliation, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for reconciliation");
            ServiceError::DatabaseError(e)
        })?;

        let stored = payment::Entity::find()
            .filter(payment::Column::GatewayOrderId.eq(fact.gateway_order_id.as_str()))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_error("Failed to load payment"))?
            .ok_or_else(|| ServiceError::PaymentNotFound(fact.gateway_order_id.clone()))?;

        let current_order = order::Entity::find_by_id(stored.order_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_error("Failed to load order"))?
            .ok_or_else(|| ServiceError::OrderNotFound(stored.order_id.to_string()))?;

        // Only the newest attempt speaks for the order; older ones are judged
        // against their own status and never move it.
        let is_latest = latest_attempt_in(&txn, current_order.id)
            .await
            .map_err(db_error("Failed to load latest payment attempt"))?
            .map(|latest| latest.id == stored.id)
            .unwrap_or(false);
        let current = if is_latest {
            current_order.payment_status
        } else {
            stored.payment_status()
        };

        let outcome = classify(current, &stored.transaction_status, &fact.transaction_status);
        let in_flight = stored.payment_status() == PaymentStatus::Pending;

        if let Some(amount) = fact.gross_amount {
            if amount != stored.gross_amount {
                warn!(%amount, expected = %stored.gross_amount, "Gateway amount differs from recorded amount");
            }
        }

        let mut active: payment::ActiveModel = stored.clone().into();
        if outcome.stores_transaction_status(in_flight) {
            active.transaction_status = Set(fact.transaction_status.clone());
        }
        if let Some(transaction_id) = &fact.transaction_id {
            active.transaction_id = Set(Some(transaction_id.clone()));
        }
        if let Some(payment_type) = &fact.payment_type {
            active.payment_type = Set(Some(payment_type.clone()));
        }
        if let Some(transaction_time) = fact.transaction_time {
            active.transaction_time = Set(Some(transaction_time));
        }
        if let Some(va_number) = &fact.va_number {
            active.va_number = Set(Some(va_number.clone()));
        }
        if let Some(bank) = &fact.bank {
            active.bank = Set(Some(bank.clone()));
        }
        if let Some(fraud_status) = &fact.fraud_status {
            active.fraud_status = Set(Some(fraud_status.clone()));
        }
        if let Some(status_message) = &fact.status_message {
            active.status_message = Set(Some(status_message.clone()));
        }
        active.raw_payload = Set(Some(fact.raw_payload.clone()));
        // Force a write so updated_at moves even when only metadata changed.
        active.updated_at = Set(Utc::now());

        let payment = active
            .update(&txn)
            .await
            .map_err(db_error("Failed to update payment"))?;

        let order = match outcome.advanced_to() {
            Some(next) if is_latest => {
                let mut order_update: order::ActiveModel = current_order.into();
                order_update.payment_status = Set(next);
                if next == PaymentStatus::Paid {
                    order_update.payment_method = Set(payment.payment_type.clone());
                }
                let updated = order_update
                    .update(&txn)
                    .await
                    .map_err(db_error("Failed to update order payment status"))?;

                if next == PaymentStatus::Paid {
                    notification::ActiveModel::unread(
                        NotificationKind::PaymentReceived,
                        payment_received_message(&updated.order_number),
                        Some(updated.id),
                        Some(updated.table_id),
                    )
                    .insert(&txn)
                    .await
                    .map_err(db_error("Failed to insert payment notification"))?;
                }
                updated
            }
            _ => current_order,
        };

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit reconciliation");
            ServiceError::DatabaseError(e)
        })?;

        match outcome {
            ReconcileOutcome::Advanced { from, to } => {
                info!(order_number = %order.order_number, %from, %to, "Payment status advanced")
            }
            ReconcileOutcome::Stale { current, incoming } => {
                warn!(order_number = %order.order_number, %current, %incoming, "Stale gateway status ignored")
            }
            other => info!(order_number = %order.order_number, outcome = %other, "Gateway fact applied"),
        }

        Ok(Reconciliation {
            outcome,
            order,
            payment,
        })
    }

    async fn list_attempts(&self, filter: &PaymentFilter) -> Result<(Vec<payment::Model>, u64), ServiceError> {
        let mut query = payment::Entity::find();
        if let Some(status) = filter.transaction_status.as_deref() {
            query = query.filter(payment::Column::TransactionStatus.eq(status.trim().to_ascii_lowercase()));
        }
        if let Some(order_id) = filter.order_id {
            query = query.filter(payment::Column::OrderId.eq(order_id));
        }
        if let Some(from) = filter.created_from() {
            query = query.filter(payment::Column::CreatedAt.gte(from));
        }
        if let Some(before) = filter.created_before() {
            query = query.filter(payment::Column::CreatedAt.lt(before));
        }

        let paginator = query
            .order_by_desc(payment::Column::CreatedAt)
            .paginate(&*self.db_pool, filter.per_page());

        let total = paginator
            .num_items()
            .await
            .map_err(db_error("Failed to count payments"))?;
        let payments = paginator
            .fetch_page(filter.page() - 1)
            .await
            .map_err(db_error("Failed to list payments"))?;

        Ok((payments, total))
    }
}
