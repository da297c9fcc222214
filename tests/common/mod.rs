#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::{json, Value};
use table_order_api::{
    auth::{issue_staff_token, StaffRole, SESSION_TOKEN_HEADER},
    build_router,
    config::AppConfig,
    db,
    entities::{customer_session, dining_table, menu_item, notification, order},
    events::{self, EventSender},
    gateway::{midtrans::signature_for, MidtransClient, MidtransConfig},
    models::{NotificationKind, TableStatus},
    notifications::{Audience, Broadcast, BroadcastKind, NotificationHub, Subscription},
    services::{
        orders::{CreateOrderRequest, OrderWithItems},
        pricing::CartLine,
        sessions::{StartSessionRequest, StartedSession},
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const JWT_SECRET: &str = "integration_test_secret_that_is_long_enough";
pub const SERVER_KEY: &str = "SB-Mid-server-integration-key";
pub const SNAP_TOKEN: &str = "snap-token-123";

/// Application over an in-memory SQLite database, with the payment gateway
/// pointed at a local mock server.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: MockServer,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.midtrans_server_key = SERVER_KEY.to_string();
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let gateway = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/snap/v1/transactions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "token": SNAP_TOKEN,
                "redirect_url": format!("{}/snap/v2/vtweb/{}", gateway.uri(), SNAP_TOKEN),
            })))
            .mount(&gateway)
            .await;

        let client = MidtransClient::new(MidtransConfig {
            server_key: SERVER_KEY.to_string(),
            snap_url: gateway.uri(),
            api_url: gateway.uri(),
            timeout: Duration::from_secs(2),
        })
        .expect("gateway client");

        let (event_tx, event_rx) = mpsc::channel(256);
        let hub = NotificationHub::new(cfg.fanout_capacity);
        let event_task = tokio::spawn(events::process_events(event_rx, hub.clone()));

        let state = AppState::new(
            Arc::new(pool),
            Arc::new(cfg),
            Arc::new(client),
            Some(Arc::new(EventSender::new(event_tx))),
            hub,
        )
        .expect("app state");
        let router = build_router(state.clone()).expect("router");

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    pub fn staff_token(&self) -> String {
        issue_staff_token(
            JWT_SECRET,
            "staff-1",
            Some("Test Staff".to_string()),
            StaffRole::Staff,
            chrono::Duration::hours(1),
        )
        .expect("staff token")
    }

    pub async fn seed_table(&self, table_number: &str) -> dining_table::Model {
        let now = Utc::now();
        dining_table::ActiveModel {
            id: Set(Uuid::new_v4()),
            table_number: Set(table_number.to_string()),
            qr_code: Set(None),
            capacity: Set(4),
            status: Set(TableStatus::Available),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed table")
    }

    pub async fn seed_menu_item(&self, name: &str, price: Decimal, stock: Option<i32>) -> menu_item::Model {
        let now = Utc::now();
        menu_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            category_id: Set(None),
            name: Set(name.to_string()),
            description: Set(None),
            price: Set(price),
            is_available: Set(true),
            preparation_time: Set(Some(10)),
            stock_quantity: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed menu item")
    }

    pub async fn start_session(&self, table_number: &str) -> StartedSession {
        self.state
            .sessions
            .start_session(StartSessionRequest {
                table_number: table_number.to_string(),
                customer_name: Some("Budi".to_string()),
                customer_phone: None,
            })
            .await
            .expect("start session")
    }

    pub async fn session(&self, started: &StartedSession) -> customer_session::Model {
        self.state
            .sessions
            .authenticate(&started.session_token)
            .await
            .expect("active session")
    }

    pub async fn place_order(
        &self,
        session: &customer_session::Model,
        lines: &[(Uuid, i32)],
    ) -> OrderWithItems {
        self.state
            .orders
            .create_order(session, order_request(lines))
            .await
            .expect("place order")
    }

    pub async fn reload_order(&self, order_id: Uuid) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("load order")
            .expect("order exists")
    }

    pub async fn reload_menu_item(&self, id: Uuid) -> menu_item::Model {
        menu_item::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("load menu item")
            .expect("menu item exists")
    }

    pub async fn reload_table(&self, id: Uuid) -> dining_table::Model {
        dining_table::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("load table")
            .expect("table exists")
    }

    pub async fn notifications_of(&self, kind: NotificationKind) -> Vec<notification::Model> {
        notification::Entity::find()
            .filter(notification::Column::Kind.eq(kind))
            .all(&*self.state.db)
            .await
            .expect("load notifications")
    }

    /// Serves a canned status-endpoint answer for one gateway order id.
    pub async fn mount_gateway_status(&self, gateway_order_id: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/v2/{}/status", gateway_order_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.gateway)
            .await;
    }

    pub fn subscribe(&self, audience: Audience) -> Subscription {
        self.state.hub.subscribe(audience)
    }

    /// Send a request against the router with optional body and headers.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, String)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn staff_request(&self, method: Method, uri: &str, body: Option<Value>) -> axum::response::Response {
        let bearer = format!("Bearer {}", self.staff_token());
        self.request(method, uri, body, &[("authorization", bearer)]).await
    }

    pub async fn customer_request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        session_token: &str,
    ) -> axum::response::Response {
        self.request(method, uri, body, &[(SESSION_TOKEN_HEADER, session_token.to_string())])
            .await
    }

    /// Posts a raw webhook body exactly as the gateway would.
    pub async fn post_webhook(&self, payload: &Value) -> axum::response::Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("failed to build webhook request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during webhook request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn order_request(lines: &[(Uuid, i32)]) -> CreateOrderRequest {
    CreateOrderRequest {
        items: lines
            .iter()
            .map(|(menu_item_id, quantity)| CartLine {
                menu_item_id: *menu_item_id,
                quantity: *quantity,
                notes: None,
            })
            .collect(),
        notes: None,
    }
}

fn status_code_for(transaction_status: &str) -> &'static str {
    match transaction_status {
        "capture" | "settlement" => "200",
        "pending" => "201",
        _ => "202",
    }
}

/// Gateway notification body with a valid signature.
pub fn signed_notification(gateway_order_id: &str, transaction_status: &str, gross_amount: &str) -> Value {
    let status_code = status_code_for(transaction_status);
    json!({
        "transaction_time": "2024-05-01 19:30:00",
        "transaction_status": transaction_status,
        "transaction_id": format!("trx-{}", gateway_order_id),
        "status_message": "midtrans payment notification",
        "status_code": status_code,
        "signature_key": signature_for(gateway_order_id, status_code, gross_amount, SERVER_KEY),
        "payment_type": "qris",
        "order_id": gateway_order_id,
        "merchant_id": "G000000000",
        "gross_amount": gross_amount,
        "fraud_status": "accept",
        "currency": "IDR",
    })
}

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// Waits briefly for the next broadcast this subscription can see.
pub async fn next_broadcast(subscription: &mut Subscription) -> Option<Broadcast> {
    tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .ok()
        .flatten()
}

/// Skips unrelated traffic until a broadcast of `kind` shows up.
pub async fn wait_for(subscription: &mut Subscription, kind: BroadcastKind) -> Option<Broadcast> {
    while let Some(message) = next_broadcast(subscription).await {
        if message.kind == kind {
            return Some(message);
        }
    }
    None
}
