use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use super::common::{created_response, success_response};
use crate::{
    auth::{Caller, CustomerSession, StaffUser},
    errors::ServiceError,
    repositories::PaymentFilter,
    AppState,
};

/// POST /orders/:id/payments
pub async fn create_payment(
    State(state): State<AppState>,
    CustomerSession(session): CustomerSession,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let initiated = state
        .payments
        .create_payment(order_id, &Caller::Customer(session))
        .await?;
    Ok(created_response(initiated))
}

/// GET /orders/:id/payments/status
pub async fn check_payment_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let status = state.payments.check_payment_status(order_id, &caller).await?;
    Ok(success_response(status))
}

/// GET /payments
pub async fn list_payments(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(filter): Query<PaymentFilter>,
) -> Result<Response, ServiceError> {
    let page = state.payments.list_payments(filter).await?;
    Ok(success_response(page))
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/payments", get(list_payments))
        .route("/orders/:id/payments", post(create_payment))
        .route("/orders/:id/payments/status", get(check_payment_status))
}
