//! Payment gateway seam. The services only talk to [`PaymentGateway`]; the
//! Midtrans adapter is the production implementation.

pub mod midtrans;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

pub use midtrans::{MidtransClient, MidtransConfig};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionItem {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
}

/// Everything the gateway needs to open a hosted payment page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub gateway_order_id: String,
    pub gross_amount: Decimal,
    pub items: Vec<TransactionItem>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub expiry_minutes: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionToken {
    pub token: String,
    pub redirect_url: String,
}

/// One observation of a transaction, from a webhook push or a status pull.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayFact {
    pub gateway_order_id: String,
    pub transaction_status: String,
    pub transaction_id: Option<String>,
    pub payment_type: Option<String>,
    pub gross_amount: Option<Decimal>,
    pub transaction_time: Option<DateTime<Utc>>,
    pub va_number: Option<String>,
    pub bank: Option<String>,
    pub fraud_status: Option<String>,
    pub status_message: Option<String>,
    /// Gateway payload exactly as received
    pub raw_payload: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionToken, ServiceError>;

    async fn get_transaction_status(&self, gateway_order_id: &str)
        -> Result<GatewayFact, ServiceError>;

    fn verify_signature(
        &self,
        order_id: &str,
        status_code: &str,
        gross_amount: &str,
        signature_key: &str,
    ) -> bool;

    /// Verifies and parses a webhook body. Nothing is trusted before the
    /// signature check passes.
    fn parse_notification(&self, payload: &[u8]) -> Result<GatewayFact, ServiceError>;
}
