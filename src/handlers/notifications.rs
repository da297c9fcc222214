use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, put},
    Router,
};
use serde_json::json;
use uuid::Uuid;

use super::common::success_response;
use crate::{
    auth::StaffUser, errors::ServiceError, services::notifications::NotificationQuery, AppState,
};

/// GET /notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Response, ServiceError> {
    let notifications = state.notifications.list(&query).await?;
    Ok(success_response(notifications))
}

/// GET /notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> Result<Response, ServiceError> {
    Ok(success_response(state.notifications.unread_count().await?))
}

/// PUT /notifications/:id/read
pub async fn mark_as_read(
    State(state): State<AppState>,
    _staff: StaffUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    Ok(success_response(state.notifications.mark_as_read(id).await?))
}

/// PUT /notifications/read-all
pub async fn mark_all_as_read(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> Result<Response, ServiceError> {
    let updated = state.notifications.mark_all_as_read().await?;
    Ok(success_response(json!({ "updated": updated })))
}

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", put(mark_all_as_read))
        .route("/notifications/:id/read", put(mark_as_read))
}
