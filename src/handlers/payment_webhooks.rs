use axum::{extract::State, routing::post, Json, Router};
use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::{errors::ServiceError, models::ReconcileOutcome, AppState};

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub order_number: String,
    #[serde(flatten)]
    pub outcome: ReconcileOutcome,
}

/// POST /payments/webhook
///
/// Answers 200 for every verified notification, stale and duplicate ones
/// included, so the gateway stops retrying. Signature failures are 401,
/// unknown payments 404, and anything transient surfaces as 5xx so the
/// gateway delivers again.
pub async fn payment_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    let reconciliation = state.reconciler.handle_webhook(&body).await?;
    info!(
        order_number = %reconciliation.order.order_number,
        outcome = %reconciliation.outcome,
        "Gateway notification processed"
    );
    Ok(Json(WebhookAck {
        status: "ok",
        order_number: reconciliation.order.order_number,
        outcome: reconciliation.outcome,
    }))
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/payments/webhook", post(payment_webhook))
}
