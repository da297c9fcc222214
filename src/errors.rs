use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Stable machine-readable kind, see [`ErrorKind`]
    pub kind: ErrorKind,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

/// Coarse error taxonomy exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Auth,
    Gateway,
    Signature,
    RateLimited,
    Internal,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Quantity must be at least 1 for menu item {0}")]
    InvalidQuantity(Uuid),

    #[error("Order must contain at least one item")]
    EmptyOrder,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Menu item {0} not found")]
    ItemNotFound(Uuid),

    #[error("Order {0} not found")]
    OrderNotFound(String),

    #[error("Payment {0} not found")]
    PaymentNotFound(String),

    #[error("Menu item {0} is not available")]
    ItemUnavailable(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("A payment for order {0} is already in progress")]
    PaymentInProgress(String),

    #[error("Order {0} is already paid")]
    AlreadyPaid(String),

    #[error("Table {0} already has an active session")]
    DuplicateActiveSession(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payment gateway error: {0}")]
    PaymentGatewayError(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Rate limit exceeded, retry in {0} seconds")]
    RateLimitExceeded(u64),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationError(_)
            | Self::InvalidInput(_)
            | Self::InvalidOperation(_)
            | Self::InvalidQuantity(_)
            | Self::EmptyOrder => ErrorKind::Validation,
            Self::NotFound(_)
            | Self::ItemNotFound(_)
            | Self::OrderNotFound(_)
            | Self::PaymentNotFound(_) => ErrorKind::NotFound,
            Self::ItemUnavailable(_)
            | Self::InsufficientStock(_)
            | Self::InvalidTransition { .. }
            | Self::PaymentInProgress(_)
            | Self::AlreadyPaid(_)
            | Self::DuplicateActiveSession(_)
            | Self::Conflict(_) => ErrorKind::Conflict,
            Self::AuthError(_) | Self::Forbidden(_) => ErrorKind::Auth,
            Self::PaymentGatewayError(_) => ErrorKind::Gateway,
            Self::InvalidSignature => ErrorKind::Signature,
            Self::RateLimitExceeded(_) => ErrorKind::RateLimited,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ValidationError(_)
            | Self::InvalidInput(_)
            | Self::InvalidOperation(_)
            | Self::EmptyOrder => StatusCode::BAD_REQUEST,
            Self::InvalidQuantity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_)
            | Self::ItemNotFound(_)
            | Self::OrderNotFound(_)
            | Self::PaymentNotFound(_) => StatusCode::NOT_FOUND,
            Self::ItemUnavailable(_)
            | Self::InsufficientStock(_)
            | Self::InvalidTransition { .. }
            | Self::PaymentInProgress(_)
            | Self::AlreadyPaid(_)
            | Self::DuplicateActiveSession(_)
            | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::AuthError(_) | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PaymentGatewayError(_) => StatusCode::BAD_GATEWAY,
            Self::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            Self::PaymentGatewayError(_) => "Payment gateway unavailable, please retry".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            kind: self.kind(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
