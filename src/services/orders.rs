use crate::{
    auth::Caller,
    entities::{customer_session, order, order_item},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{OrderItemStatus, OrderStatus},
    repositories::{NewOrder, OrderFilter, OrderStore},
    services::pricing::{validate_cart, CartLine, ChargeRatesHandle, MenuCatalog},
    PaginatedResponse,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub items: Vec<CartLine>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateItemStatusRequest {
    pub status: OrderItemStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Staff see every order; a customer only the orders of their own session.
pub fn ensure_visible(order: &order::Model, caller: &Caller) -> Result<(), ServiceError> {
    if caller.can_access_session(order.session_id) {
        return Ok(());
    }
    warn!(order_id = %order.id, "Caller does not own order");
    Err(ServiceError::Forbidden(format!(
        "order {} belongs to another session",
        order.order_number
    )))
}

/// Service for placing orders and moving them through the kitchen
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    catalog: Arc<dyn MenuCatalog>,
    rates: ChargeRatesHandle,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        catalog: Arc<dyn MenuCatalog>,
        rates: ChargeRatesHandle,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            store,
            catalog,
            rates,
            event_sender,
        }
    }

    fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event) {
                warn!(error = %e, "Failed to publish order event");
            }
        }
    }

    /// Prices the cart against the live menu and persists the order in one
    /// transaction. Staff hear about it only after the commit.
    #[instrument(skip(self, session, request), fields(session_id = %session.id, lines = request.items.len()))]
    pub async fn create_order(
        &self,
        session: &customer_session::Model,
        request: CreateOrderRequest,
    ) -> Result<OrderWithItems, ServiceError> {
        request.validate()?;

        let rates = self.rates.current().await;
        let cart = validate_cart(self.catalog.as_ref(), &rates, &request.items).await?;

        let placed = self
            .store
            .create_order(NewOrder {
                session_id: session.id,
                notes: request.notes,
                cart,
            })
            .await?;

        counter!("table_order.orders_created", 1);
        self.publish(Event::NewOrder {
            order_id: placed.order.id,
            order_number: placed.order.order_number.clone(),
            table_id: placed.order.table_id,
            table_number: placed.table_number.clone(),
            grand_total: placed.order.grand_total,
        });

        info!(order_number = %placed.order.order_number, "Order placed");
        Ok(OrderWithItems {
            order: placed.order,
            items: placed.items,
        })
    }

    /// Gets an order with its items if the caller may see it.
    #[instrument(skip(self, caller))]
    pub async fn get_order(&self, order_id: Uuid, caller: &Caller) -> Result<OrderWithItems, ServiceError> {
        let order = self.find_visible(order_id, caller).await?;
        let items = self.store.find_items(order.id).await?;
        Ok(OrderWithItems { order, items })
    }

    async fn find_visible(&self, order_id: Uuid, caller: &Caller) -> Result<order::Model, ServiceError> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;
        ensure_visible(&order, caller)?;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let change = self.store.update_order_status(order_id, status).await?;

        self.publish(Event::OrderStatusUpdated {
            order_id: change.order.id,
            order_number: change.order.order_number.clone(),
            table_id: change.order.table_id,
            previous: change.previous,
            status: change.order.status,
        });

        Ok(change.order)
    }

    #[instrument(skip(self))]
    pub async fn update_order_item_status(
        &self,
        item_id: Uuid,
        status: OrderItemStatus,
    ) -> Result<order_item::Model, ServiceError> {
        let change = self.store.update_item_status(item_id, status).await?;

        self.publish(Event::OrderItemStatusUpdated {
            order_id: change.order.id,
            item_id: change.item.id,
            table_id: change.order.table_id,
            status: change.item.status,
        });

        Ok(change.item)
    }

    pub async fn list_session_orders(&self, session_id: Uuid) -> Result<Vec<order::Model>, ServiceError> {
        self.store.list_session_orders(session_id).await
    }

    pub async fn list_orders(&self, filter: OrderFilter) -> Result<PaginatedResponse<order::Model>, ServiceError> {
        let (orders, total) = self.store.list_orders(&filter).await?;
        Ok(PaginatedResponse::new(orders, total, filter.page(), filter.per_page()))
    }
}
