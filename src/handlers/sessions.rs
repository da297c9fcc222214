use axum::{
    extract::State,
    response::Response,
    routing::{delete, post},
    Json, Router,
};

use super::common::{created_response, no_content_response};
use crate::{
    auth::CustomerSession, errors::ServiceError, services::sessions::StartSessionRequest, AppState,
};

/// POST /sessions. Public: scanning the table QR code lands here.
pub async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> Result<Response, ServiceError> {
    let started = state.sessions.start_session(request).await?;
    Ok(created_response(started))
}

/// DELETE /sessions/current
pub async fn end_session(
    State(state): State<AppState>,
    CustomerSession(session): CustomerSession,
) -> Result<Response, ServiceError> {
    state.sessions.end_session(&session.session_token).await?;
    Ok(no_content_response())
}

/// POST /sessions/current/assistance
pub async fn request_assistance(
    State(state): State<AppState>,
    CustomerSession(session): CustomerSession,
) -> Result<Response, ServiceError> {
    let notification = state.sessions.request_assistance(&session).await?;
    Ok(created_response(notification))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(start_session))
        .route("/sessions/current", delete(end_session))
        .route("/sessions/current/assistance", post(request_assistance))
}
