use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha512};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, instrument, warn};

use super::{GatewayFact, PaymentGateway, TransactionRequest, TransactionToken};
use crate::config::AppConfig;
use crate::errors::ServiceError;

const SANDBOX_SNAP_URL: &str = "https://app.sandbox.midtrans.com";
const PRODUCTION_SNAP_URL: &str = "https://app.midtrans.com";
const SANDBOX_API_URL: &str = "https://api.sandbox.midtrans.com";
const PRODUCTION_API_URL: &str = "https://api.midtrans.com";

/// Midtrans reports local time in WIB.
const GATEWAY_UTC_OFFSET_SECS: i32 = 7 * 3600;
const TRANSACTION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MAX_ITEM_NAME_LEN: usize = 50;

const ENABLED_PAYMENTS: &[&str] = &[
    "bank_transfer",
    "credit_card",
    "gopay",
    "qris",
    "shopeepay",
    "bca_klikpay",
    "alfamart",
    "indomaret",
];

#[derive(Clone, Debug)]
pub struct MidtransConfig {
    pub server_key: String,
    pub snap_url: String,
    pub api_url: String,
    pub timeout: Duration,
}

impl MidtransConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let production = config.midtrans_environment == "production";
        Self {
            server_key: config.midtrans_server_key.clone(),
            snap_url: config.midtrans_snap_url.clone().unwrap_or_else(|| {
                (if production { PRODUCTION_SNAP_URL } else { SANDBOX_SNAP_URL }).to_string()
            }),
            api_url: config.midtrans_api_url.clone().unwrap_or_else(|| {
                (if production { PRODUCTION_API_URL } else { SANDBOX_API_URL }).to_string()
            }),
            timeout: config.gateway_timeout(),
        }
    }
}

/// Snap (hosted page) and Core API (status) client.
#[derive(Clone)]
pub struct MidtransClient {
    client: Client,
    config: MidtransConfig,
}

impl MidtransClient {
    pub fn new(config: MidtransConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("failed to build gateway client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn transport_error(e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            warn!("Payment gateway request timed out");
            ServiceError::PaymentGatewayError("gateway timed out".to_string())
        } else {
            error!(error = %e, "Payment gateway request failed");
            ServiceError::PaymentGatewayError(e.to_string())
        }
    }
}

/// Notification body, also the shape of the status endpoint response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MidtransNotification {
    pub transaction_time: String,
    pub transaction_status: String,
    pub transaction_id: String,
    pub status_message: String,
    pub status_code: String,
    pub signature_key: String,
    pub payment_type: String,
    pub order_id: String,
    pub merchant_id: String,
    pub gross_amount: String,
    pub fraud_status: String,
    pub currency: String,
    pub va_numbers: Vec<VaNumber>,
    pub permata_va_number: String,
    pub bank: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaNumber {
    pub bank: String,
    pub va_number: String,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl MidtransNotification {
    pub fn va_number(&self) -> Option<String> {
        non_empty(&self.permata_va_number)
            .or_else(|| self.va_numbers.first().and_then(|va| non_empty(&va.va_number)))
    }

    pub fn bank(&self) -> Option<String> {
        non_empty(&self.bank)
            .or_else(|| self.va_numbers.first().and_then(|va| non_empty(&va.bank)))
            .or_else(|| {
                (self.payment_type.contains("bank_transfer")
                    && non_empty(&self.permata_va_number).is_some())
                .then(|| "permata".to_string())
            })
    }

    /// Unparseable times are dropped rather than failing the whole fact.
    pub fn transaction_time(&self) -> Option<DateTime<Utc>> {
        let raw = non_empty(&self.transaction_time)?;
        let naive = match NaiveDateTime::parse_from_str(&raw, TRANSACTION_TIME_FORMAT) {
            Ok(naive) => naive,
            Err(e) => {
                warn!(error = %e, raw = %raw, "Unparseable gateway transaction time");
                return None;
            }
        };
        FixedOffset::east_opt(GATEWAY_UTC_OFFSET_SECS)?
            .from_local_datetime(&naive)
            .single()
            .map(|local| local.with_timezone(&Utc))
    }

    pub fn into_fact(self, raw_payload: String) -> GatewayFact {
        GatewayFact {
            gateway_order_id: self.order_id.clone(),
            transaction_status: self.transaction_status.trim().to_ascii_lowercase(),
            transaction_id: non_empty(&self.transaction_id),
            payment_type: non_empty(&self.payment_type),
            gross_amount: Decimal::from_str(self.gross_amount.trim()).ok(),
            transaction_time: self.transaction_time(),
            va_number: self.va_number(),
            bank: self.bank(),
            fraud_status: non_empty(&self.fraud_status),
            status_message: non_empty(&self.status_message),
            raw_payload,
        }
    }
}

pub fn signature_for(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

fn whole_amount(amount: Decimal) -> Result<i64, ServiceError> {
    amount
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::InvalidInput(format!("amount {} out of range", amount)))
}

#[derive(Debug, Deserialize)]
struct SnapResponse {
    token: String,
    redirect_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SnapError {
    error_messages: Vec<String>,
}

#[async_trait]
impl PaymentGateway for MidtransClient {
    #[instrument(skip(self, request), fields(gateway_order_id = %request.gateway_order_id))]
    async fn create_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionToken, ServiceError> {
        let items = request
            .items
            .iter()
            .map(|item| -> Result<serde_json::Value, ServiceError> {
                Ok(json!({
                    "id": item.id,
                    "name": item.name.chars().take(MAX_ITEM_NAME_LEN).collect::<String>(),
                    "price": whole_amount(item.price)?,
                    "quantity": item.quantity,
                }))
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let body = json!({
            "transaction_details": {
                "order_id": request.gateway_order_id,
                "gross_amount": whole_amount(request.gross_amount)?,
            },
            "item_details": items,
            "customer_details": {
                "first_name": request.customer_name,
                "phone": request.customer_phone,
            },
            "enabled_payments": ENABLED_PAYMENTS,
            "expiry": {
                "duration": request.expiry_minutes,
                "unit": "minute",
            },
        });

        let response = self
            .client
            .post(format!("{}/snap/v1/transactions", self.config.snap_url))
            .basic_auth(&self.config.server_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.json::<SnapError>().await.unwrap_or_default();
            warn!(%status, errors = ?detail.error_messages, "Gateway rejected transaction");
            return Err(ServiceError::PaymentGatewayError(format!(
                "gateway returned {}: {}",
                status,
                detail.error_messages.join("; ")
            )));
        }

        let snap: SnapResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Malformed gateway transaction response");
            ServiceError::PaymentGatewayError("malformed gateway response".to_string())
        })?;

        Ok(TransactionToken {
            token: snap.token,
            redirect_url: snap.redirect_url,
        })
    }

    #[instrument(skip(self))]
    async fn get_transaction_status(
        &self,
        gateway_order_id: &str,
    ) -> Result<GatewayFact, ServiceError> {
        let response = self
            .client
            .get(format!("{}/v2/{}/status", self.config.api_url, gateway_order_id))
            .basic_auth(&self.config.server_key, Some(""))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::PaymentNotFound(gateway_order_id.to_string()));
        }
        if !status.is_success() {
            warn!(%status, "Gateway status check failed");
            return Err(ServiceError::PaymentGatewayError(format!("gateway returned {}", status)));
        }

        let raw = response.text().await.map_err(Self::transport_error)?;
        let parsed: MidtransNotification = serde_json::from_str(&raw).map_err(|e| {
            error!(error = %e, "Malformed gateway status response");
            ServiceError::PaymentGatewayError("malformed gateway response".to_string())
        })?;

        // The status endpoint answers 200 with an error code in the body.
        if parsed.transaction_status.trim().is_empty() {
            return match parsed.status_code.as_str() {
                "404" => Err(ServiceError::PaymentNotFound(gateway_order_id.to_string())),
                code => Err(ServiceError::PaymentGatewayError(format!(
                    "gateway status {}: {}",
                    code, parsed.status_message
                ))),
            };
        }

        let mut fact = parsed.into_fact(raw);
        if fact.gateway_order_id.is_empty() {
            fact.gateway_order_id = gateway_order_id.to_string();
        }
        Ok(fact)
    }

    fn verify_signature(
        &self,
        order_id: &str,
        status_code: &str,
        gross_amount: &str,
        signature_key: &str,
    ) -> bool {
        let expected = signature_for(order_id, status_code, gross_amount, &self.config.server_key);
        constant_time_eq(&expected, &signature_key.trim().to_ascii_lowercase())
    }

    fn parse_notification(&self, payload: &[u8]) -> Result<GatewayFact, ServiceError> {
        let notification: MidtransNotification = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::InvalidInput(format!("invalid notification body: {}", e)))?;

        if !self.verify_signature(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &notification.signature_key,
        ) {
            warn!(gateway_order_id = %notification.order_id, "Webhook signature verification failed");
            return Err(ServiceError::InvalidSignature);
        }

        if notification.order_id.trim().is_empty() || notification.transaction_status.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "notification is missing order_id or transaction_status".to_string(),
            ));
        }

        let raw = String::from_utf8_lossy(payload).into_owned();
        Ok(notification.into_fact(raw))
    }
}
