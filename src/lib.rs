//! Table Order API Library
//!
//! Restaurant table-ordering backend: QR dining sessions, the kitchen order
//! pipeline, payment gateway reconciliation and live staff notifications.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod notifications;
pub mod rate_limiter;
pub mod repositories;
pub mod services;

use axum::{http::HeaderValue, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::notifications::NotificationHub;
use crate::rate_limiter::{rate_limit_middleware, RateLimitConfig, RateLimiter};
use crate::repositories::{OrderStore, PaymentStore, SeaOrmOrderStore, SeaOrmPaymentStore};
use crate::services::{
    notifications::NotificationService,
    orders::OrderService,
    payments::PaymentService,
    pricing::{ChargeRates, ChargeRatesHandle, DbMenuCatalog, MenuCatalog},
    reconciler::PaymentReconciler,
    sessions::SessionService,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: Option<Arc<EventSender>>,
    pub hub: NotificationHub,
    pub rates: ChargeRatesHandle,
    pub sessions: Arc<SessionService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub reconciler: Arc<PaymentReconciler>,
    pub notifications: Arc<NotificationService>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Wires every service over one connection pool and gateway.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
        hub: NotificationHub,
    ) -> Result<Self, ServiceError> {
        let rates = ChargeRatesHandle::new(ChargeRates::from_config(&config)?);
        let catalog: Arc<dyn MenuCatalog> = Arc::new(DbMenuCatalog::new(db.clone()));
        let order_store: Arc<dyn OrderStore> = Arc::new(SeaOrmOrderStore::new(db.clone()));
        let payment_store: Arc<dyn PaymentStore> = Arc::new(SeaOrmPaymentStore::new(db.clone()));

        let reconciler = PaymentReconciler::new(
            payment_store.clone(),
            gateway.clone(),
            event_sender.clone(),
        );

        let sessions = SessionService::new(db.clone(), event_sender.clone(), config.session_expiry());
        let orders = OrderService::new(
            order_store.clone(),
            catalog.clone(),
            rates.clone(),
            event_sender.clone(),
        );
        let payments = PaymentService::new(
            order_store,
            payment_store,
            catalog,
            gateway,
            reconciler.clone(),
            event_sender.clone(),
            config.currency.clone(),
            config.payment_expiry_minutes,
        );

        Ok(Self {
            notifications: Arc::new(NotificationService::new(db.clone())),
            rate_limiter: RateLimiter::new(RateLimitConfig::from_app_config(&config)),
            sessions: Arc::new(sessions),
            orders: Arc::new(orders),
            payments: Arc::new(payments),
            reconciler: Arc::new(reconciler),
            db,
            config,
            event_sender,
            hub,
            rates,
        })
    }
}

// Common response wrappers
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, per_page: u64) -> Self {
        let total_pages = if per_page == 0 {
            0
        } else {
            total.div_ceil(per_page)
        };
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

/// Every route under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .merge(handlers::sessions::session_routes())
        .merge(handlers::orders::order_routes())
        .merge(handlers::payments::payment_routes())
        .merge(handlers::payment_webhooks::webhook_routes())
        .merge(handlers::notifications::notification_routes())
        .merge(handlers::live::live_routes())
        .merge(handlers::health::health_routes())
}

/// Builds the CORS layer from `cors_allowed_origins`; permissive outside
/// production when nothing is configured.
pub fn cors_layer(cfg: &AppConfig) -> Result<CorsLayer, ServiceError> {
    let configured: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    match configured {
        Some(origins) => Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)),
        None if !cfg.is_production() => {
            info!("Using permissive CORS because no origins are configured");
            Ok(CorsLayer::permissive())
        }
        None => Err(ServiceError::InternalError(
            "set APP__CORS_ALLOWED_ORIGINS in production".to_string(),
        )),
    }
}

/// Full application router with per-client rate limiting, HTTP tracing and
/// request ids.
pub fn build_router(state: AppState) -> Result<Router, ServiceError> {
    let cors = cors_layer(&state.config)?;
    let limiter = state.rate_limiter.clone();
    Ok(Router::new()
        .nest("/api/v1", api_v1_routes())
        .layer(axum::middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .with_state(state))
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn success_response_carries_timestamp() {
        let response = ApiResponse::success("ok");
        let meta = response.meta.expect("metadata expected");
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
        assert!(response.success);
    }

    #[test]
    fn error_response_has_no_data() {
        let response = ApiResponse::<()>::error("oops".into());
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.message.as_deref(), Some("oops"));
    }

    #[test]
    fn pagination_rounds_pages_up() {
        let page = PaginatedResponse::new(vec![1, 2], 41, 1, 20);
        assert_eq!(page.total_pages, 3);
        assert_eq!(PaginatedResponse::<u8>::new(vec![], 0, 1, 20).total_pages, 0);
    }
}
