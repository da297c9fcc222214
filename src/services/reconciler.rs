use metrics::counter;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{GatewayFact, PaymentGateway},
    models::PaymentStatus,
    repositories::{PaymentStore, Reconciliation},
};

/// Single entry point for gateway facts, whether pushed by webhook or
/// pulled on demand. Every fact goes through the same finality guard.
#[derive(Clone)]
pub struct PaymentReconciler {
    payments: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentReconciler {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            payments,
            gateway,
            event_sender,
        }
    }

    /// Verifies a raw webhook body and applies it. A bad signature leaves
    /// every row untouched.
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    pub async fn handle_webhook(&self, body: &[u8]) -> Result<Reconciliation, ServiceError> {
        let fact = self.gateway.parse_notification(body).map_err(|e| {
            warn!(error = %e, "Rejected gateway notification");
            e
        })?;
        self.apply(&fact).await
    }

    #[instrument(skip(self, fact), fields(gateway_order_id = %fact.gateway_order_id))]
    pub async fn apply(&self, fact: &GatewayFact) -> Result<Reconciliation, ServiceError> {
        let reconciliation = self.payments.apply_fact(fact).await?;
        counter!(
            "table_order.reconciliations",
            1,
            "outcome" => reconciliation.outcome.to_string()
        );

        // The store only moves the order for its latest attempt.
        if let Some(next) = reconciliation.outcome.advanced_to() {
            if reconciliation.order.payment_status == next {
                self.announce(&reconciliation, next);
            }
        }

        Ok(reconciliation)
    }

    fn announce(&self, reconciliation: &Reconciliation, status: PaymentStatus) {
        let Some(sender) = &self.event_sender else {
            return;
        };
        let order = &reconciliation.order;
        let event = if status == PaymentStatus::Paid {
            info!(order_number = %order.order_number, "Payment received");
            Event::PaymentReceived {
                order_id: order.id,
                order_number: order.order_number.clone(),
                table_id: order.table_id,
                amount: reconciliation.payment.gross_amount,
                payment_type: reconciliation.payment.payment_type.clone(),
            }
        } else {
            Event::PaymentStatusUpdated {
                order_id: order.id,
                order_number: order.order_number.clone(),
                table_id: order.table_id,
                payment_status: status,
            }
        };
        if let Err(e) = sender.send(event) {
            warn!(error = %e, "Failed to publish payment event");
        }
    }
}
