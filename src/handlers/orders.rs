use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, put},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;

use super::common::{created_response, success_response};
use crate::{
    auth::{Caller, CustomerSession, StaffUser},
    errors::ServiceError,
    repositories::OrderFilter,
    services::orders::{CreateOrderRequest, UpdateItemStatusRequest, UpdateOrderStatusRequest},
    AppState,
};

/// POST /orders
pub async fn create_order(
    State(state): State<AppState>,
    CustomerSession(session): CustomerSession,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    let order = state.orders.create_order(&session, request).await?;
    Ok(created_response(order))
}

/// GET /orders/mine
pub async fn list_my_orders(
    State(state): State<AppState>,
    CustomerSession(session): CustomerSession,
) -> Result<Response, ServiceError> {
    let orders = state.orders.list_session_orders(session.id).await?;
    Ok(success_response(orders))
}

/// GET /orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.orders.get_order(order_id, &caller).await?;
    Ok(success_response(order))
}

/// GET /orders
pub async fn list_orders(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(filter): Query<OrderFilter>,
) -> Result<Response, ServiceError> {
    let page = state.orders.list_orders(filter).await?;
    Ok(success_response(page))
}

/// PUT /orders/:id/status
pub async fn update_order_status(
    State(state): State<AppState>,
    staff: StaffUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Response, ServiceError> {
    let order = state
        .orders
        .update_order_status(order_id, request.status)
        .await?;
    info!(staff = %staff.user_id, order_number = %order.order_number, status = %order.status, "Staff updated order");
    Ok(success_response(order))
}

/// PUT /order-items/:id/status
pub async fn update_order_item_status(
    State(state): State<AppState>,
    _staff: StaffUser,
    Path(item_id): Path<Uuid>,
    Json(request): Json<UpdateItemStatusRequest>,
) -> Result<Response, ServiceError> {
    let item = state
        .orders
        .update_order_item_status(item_id, request.status)
        .await?;
    Ok(success_response(item))
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/mine", get(list_my_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", put(update_order_status))
        .route("/order-items/:id/status", put(update_order_item_status))
}
