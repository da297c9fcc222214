use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{ItemStatusChange, NewOrder, OrderFilter, OrderStatusChange, OrderStore, PlacedOrder};
use crate::db::DbPool;
use crate::entities::{
    customer_session, dining_table, inventory_log, menu_item, notification, order, order_item,
    order_sequence,
};
use crate::errors::ServiceError;
use crate::events::{new_order_message, order_ready_message};
use crate::models::{NotificationKind, OrderItemStatus, OrderStatus, PaymentStatus, TableStatus};

fn db_error(context: &'static str) -> impl Fn(DbErr) -> ServiceError {
    move |e| {
        error!(error = %e, "{}", context);
        ServiceError::DatabaseError(e)
    }
}

/// Allocates the next `ORD-YYYYMMDD-NNNNN` number from the per-day counter.
/// Must run inside the order transaction so a rollback releases nothing
/// another order could observe.
pub async fn allocate_order_number<C: ConnectionTrait>(
    conn: &C,
    now: DateTime<Utc>,
) -> Result<String, DbErr> {
    let day = now.format("%Y%m%d").to_string();

    order_sequence::Entity::insert(order_sequence::ActiveModel {
        day: Set(day.clone()),
        last_value: Set(1),
    })
    .on_conflict(
        OnConflict::column(order_sequence::Column::Day)
            .value(
                order_sequence::Column::LastValue,
                Expr::col((order_sequence::Entity, order_sequence::Column::LastValue)).add(1),
            )
            .to_owned(),
    )
    .exec_without_returning(conn)
    .await?;

    let sequence = order_sequence::Entity::find_by_id(day.clone())
        .one(conn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("order sequence for {}", day)))?;

    Ok(format!("ORD-{}-{:05}", day, sequence.last_value))
}

#[derive(Clone)]
pub struct SeaOrmOrderStore {
    db_pool: Arc<DbPool>,
}

impl SeaOrmOrderStore {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Decrements tracked stock only if enough remains. Returns whether a
    /// decrement happened; untracked items are left alone.
    async fn decrement_stock(
        txn: &DatabaseTransaction,
        menu_item_id: Uuid,
        quantity: i32,
        name: &str,
    ) -> Result<bool, ServiceError> {
        let result = menu_item::Entity::update_many()
            .col_expr(
                menu_item::Column::StockQuantity,
                Expr::col(menu_item::Column::StockQuantity).sub(quantity),
            )
            .col_expr(menu_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(menu_item::Column::Id.eq(menu_item_id))
            .filter(menu_item::Column::StockQuantity.gte(quantity))
            .exec(txn)
            .await
            .map_err(db_error("Failed to decrement stock"))?;

        if result.rows_affected > 0 {
            return Ok(true);
        }

        let current = menu_item::Entity::find_by_id(menu_item_id)
            .one(txn)
            .await
            .map_err(db_error("Failed to re-read menu item"))?
            .ok_or(ServiceError::ItemNotFound(menu_item_id))?;

        match current.stock_quantity {
            None => Ok(false),
            Some(remaining) => {
                warn!(%menu_item_id, remaining, requested = quantity, "Guarded stock decrement refused");
                metrics::counter!("table_order.stock_conflicts", 1);
                Err(ServiceError::InsufficientStock(name.to_string()))
            }
        }
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    #[instrument(skip(self, new_order), fields(session_id = %new_order.session_id, lines = new_order.cart.lines.len()))]
    async fn create_order(&self, new_order: NewOrder) -> Result<PlacedOrder, ServiceError> {
        if new_order.cart.lines.is_empty() {
            return Err(ServiceError::EmptyOrder);
        }

        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let session = customer_session::Entity::find_by_id(new_order.session_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_error("Failed to load session"))?
            .ok_or_else(|| ServiceError::AuthError("session not found".to_string()))?;
        if !session.is_active() {
            return Err(ServiceError::AuthError("session has ended".to_string()));
        }

        let table = dining_table::Entity::find_by_id(session.table_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_error("Failed to load table"))?
            .ok_or_else(|| ServiceError::NotFound(format!("table {}", session.table_id)))?;

        let order_number = allocate_order_number(&txn, now)
            .await
            .map_err(db_error("Failed to allocate order number"))?;

        let cart = new_order.cart;
        let order_id = Uuid::new_v4();
        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            session_id: Set(session.id),
            table_id: Set(table.id),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Unpaid),
            total_amount: Set(cart.total_amount),
            tax_amount: Set(cart.tax_amount),
            service_charge: Set(cart.service_charge),
            grand_total: Set(cart.grand_total),
            payment_method: Set(None),
            notes: Set(new_order.notes),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, %order_id, "Failed to insert order");
            ServiceError::DatabaseError(e)
        })?;

        let mut items = Vec::with_capacity(cart.lines.len());
        for line in &cart.lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                menu_item_id: Set(line.menu_item_id),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                subtotal: Set(line.subtotal),
                notes: Set(line.notes.clone()),
                status: Set(OrderItemStatus::Pending),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(db_error("Failed to insert order item"))?;

            if Self::decrement_stock(&txn, line.menu_item_id, line.quantity, &line.name).await? {
                inventory_log::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    menu_item_id: Set(line.menu_item_id),
                    quantity_change: Set(-line.quantity),
                    reason: Set(inventory_log::REASON_ORDER_PLACED.to_string()),
                    order_item_id: Set(Some(item.id)),
                    created_at: Set(now),
                }
                .insert(&txn)
                .await
                .map_err(db_error("Failed to append inventory log"))?;
            }

            items.push(item);
        }

        if table.status != TableStatus::Occupied {
            dining_table::Entity::update_many()
                .col_expr(dining_table::Column::Status, Expr::value(TableStatus::Occupied))
                .col_expr(dining_table::Column::UpdatedAt, Expr::value(now))
                .filter(dining_table::Column::Id.eq(table.id))
                .exec(&txn)
                .await
                .map_err(db_error("Failed to mark table occupied"))?;
        }

        notification::ActiveModel::unread(
            NotificationKind::NewOrder,
            new_order_message(&order_number, &table.table_number),
            Some(order_id),
            Some(table.id),
        )
        .insert(&txn)
        .await
        .map_err(db_error("Failed to insert new order notification"))?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(%order_id, order_number = %order.order_number, grand_total = %order.grand_total, "Order created");

        Ok(PlacedOrder {
            order,
            items,
            table_number: table.table_number,
        })
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await
            .map_err(db_error("Failed to load order"))
    }

    async fn find_items(&self, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db_pool)
            .await
            .map_err(db_error("Failed to load order items"))
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<customer_session::Model>, ServiceError> {
        customer_session::Entity::find_by_id(session_id)
            .one(&*self.db_pool)
            .await
            .map_err(db_error("Failed to load session"))
    }

    #[instrument(skip(self))]
    async fn update_order_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<OrderStatusChange, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order status update");
            ServiceError::DatabaseError(e)
        })?;

        let current = order::Entity::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_error("Failed to load order"))?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;

        let previous = current.status;
        let status = previous.transition_to(next)?;

        let mut active: order::ActiveModel = current.into();
        active.status = Set(status);
        let updated = active
            .update(&txn)
            .await
            .map_err(db_error("Failed to update order status"))?;

        if status == OrderStatus::Ready {
            notification::ActiveModel::unread(
                NotificationKind::OrderReady,
                order_ready_message(&updated.order_number),
                Some(updated.id),
                Some(updated.table_id),
            )
            .insert(&txn)
            .await
            .map_err(db_error("Failed to insert order ready notification"))?;
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to commit order status update");
            ServiceError::DatabaseError(e)
        })?;

        info!(%order_id, from = %previous, to = %status, "Order status updated");
        Ok(OrderStatusChange {
            order: updated,
            previous,
        })
    }

    #[instrument(skip(self))]
    async fn update_item_status(
        &self,
        item_id: Uuid,
        next: OrderItemStatus,
    ) -> Result<ItemStatusChange, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for item status update");
            ServiceError::DatabaseError(e)
        })?;

        let item = order_item::Entity::find_by_id(item_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_error("Failed to load order item"))?
            .ok_or_else(|| ServiceError::NotFound(format!("order item {}", item_id)))?;

        let order = order::Entity::find_by_id(item.order_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_error("Failed to load order"))?
            .ok_or_else(|| ServiceError::OrderNotFound(item.order_id.to_string()))?;

        if order.status.is_terminal() {
            return Err(ServiceError::InvalidTransition {
                from: order.status.to_string(),
                to: next.to_string(),
            });
        }

        let previous = item.status;
        let status = previous.transition_to(next)?;

        let mut active: order_item::ActiveModel = item.into();
        active.status = Set(status);
        let updated = active
            .update(&txn)
            .await
            .map_err(db_error("Failed to update order item status"))?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %item_id, "Failed to commit item status update");
            ServiceError::DatabaseError(e)
        })?;

        info!(%item_id, order_id = %order.id, from = %previous, to = %status, "Order item status updated");
        Ok(ItemStatusChange {
            item: updated,
            order,
            previous,
        })
    }

    async fn list_session_orders(&self, session_id: Uuid) -> Result<Vec<order::Model>, ServiceError> {
        order::Entity::find()
            .filter(order::Column::SessionId.eq(session_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db_pool)
            .await
            .map_err(db_error("Failed to list session orders"))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let mut query = order::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(payment_status) = filter.payment_status {
            query = query.filter(order::Column::PaymentStatus.eq(payment_status));
        }
        if let Some(table_id) = filter.table_id {
            query = query.filter(order::Column::TableId.eq(table_id));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db_pool, filter.per_page());

        let total = paginator
            .num_items()
            .await
            .map_err(db_error("Failed to count orders"))?;
        let orders = paginator
            .fetch_page(filter.page() - 1)
            .await
            .map_err(db_error("Failed to list orders"))?;

        Ok((orders, total))
    }
}
