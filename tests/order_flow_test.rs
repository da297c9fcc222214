mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use table_order_api::{
    auth::Caller,
    entities::{inventory_log, order},
    errors::ServiceError,
    models::{NotificationKind, OrderItemStatus, OrderStatus, TableStatus},
    notifications::{Audience, BroadcastKind},
    services::pricing::ChargeRates,
};

use common::{next_broadcast, order_request, read_json, TestApp};

#[tokio::test]
async fn order_totals_include_tax_and_service_charge() {
    let app = TestApp::new().await;
    let table = app.seed_table("T1").await;
    let soup = app.seed_menu_item("Tom Yum", dec!(50000), Some(10)).await;
    let started = app.start_session("T1").await;

    let response = app
        .customer_request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [{ "menu_item_id": soup.id, "quantity": 2 }] })),
            &started.session_token,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = read_json(response).await;
    let order_id: uuid::Uuid = serde_json::from_value(body["data"]["id"].clone()).unwrap();
    let stored = app.reload_order(order_id).await;

    assert_eq!(stored.total_amount, dec!(100000));
    assert_eq!(stored.tax_amount, dec!(10000));
    assert_eq!(stored.service_charge, dec!(5000));
    assert_eq!(stored.grand_total, dec!(115000));
    assert_eq!(stored.status, OrderStatus::Pending);
    assert!(stored.order_number.starts_with("ORD-"));
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(1));

    assert_eq!(app.reload_menu_item(soup.id).await.stock_quantity, Some(8));
    assert_eq!(app.reload_table(table.id).await.status, TableStatus::Occupied);
    assert_eq!(app.notifications_of(NotificationKind::NewOrder).await.len(), 1);
}

#[tokio::test]
async fn order_numbers_are_sequential_within_a_day() {
    let app = TestApp::new().await;
    app.seed_table("T1").await;
    let tea = app.seed_menu_item("Es Teh", dec!(8000), None).await;
    let session = app.session(&app.start_session("T1").await).await;

    let first = app.place_order(&session, &[(tea.id, 1)]).await;
    let second = app.place_order(&session, &[(tea.id, 1)]).await;

    let first_seq: u32 = first.order.order_number.rsplit('-').next().unwrap().parse().unwrap();
    let second_seq: u32 = second.order.order_number.rsplit('-').next().unwrap().parse().unwrap();
    assert_eq!(second_seq, first_seq + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_never_oversell_stock() {
    let app = TestApp::new().await;
    app.seed_table("T1").await;
    let rendang = app.seed_menu_item("Rendang", dec!(65000), Some(10)).await;
    let session = app.session(&app.start_session("T1").await).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let orders = app.state.orders.clone();
        let session = session.clone();
        let item_id = rendang.id;
        handles.push(tokio::spawn(async move {
            orders.create_order(&session, order_request(&[(item_id, 1)])).await
        }));
    }

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(err) => assert_matches!(err, ServiceError::InsufficientStock(_)),
        }
    }

    assert_eq!(placed, 10);
    assert_eq!(app.reload_menu_item(rendang.id).await.stock_quantity, Some(0));

    let logged = inventory_log::Entity::find()
        .filter(inventory_log::Column::MenuItemId.eq(rendang.id))
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(logged, 10);
    let orders = order::Entity::find().count(&*app.state.db).await.unwrap();
    assert_eq!(orders, 10);
}

#[tokio::test]
async fn failed_line_rolls_back_the_whole_order() {
    let app = TestApp::new().await;
    app.seed_table("T1").await;
    let satay = app.seed_menu_item("Sate Ayam", dec!(38000), Some(5)).await;
    let banana = app.seed_menu_item("Pisang Goreng", dec!(18000), Some(1)).await;
    let session = app.session(&app.start_session("T1").await).await;

    let err = app
        .state
        .orders
        .create_order(&session, order_request(&[(satay.id, 2), (banana.id, 3)]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    assert_eq!(app.reload_menu_item(satay.id).await.stock_quantity, Some(5));
    assert_eq!(order::Entity::find().count(&*app.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn changing_rates_leaves_existing_orders_alone() {
    let app = TestApp::new().await;
    app.seed_table("T1").await;
    let soup = app.seed_menu_item("Tom Yum", dec!(50000), None).await;
    let session = app.session(&app.start_session("T1").await).await;

    let before = app.place_order(&session, &[(soup.id, 2)]).await;
    app.state.rates.replace(ChargeRates::new(dec!(20), dec!(0), 0)).await;
    let after = app.place_order(&session, &[(soup.id, 2)]).await;

    assert_eq!(app.reload_order(before.order.id).await.grand_total, dec!(115000));
    assert_eq!(after.order.tax_amount, dec!(20000));
    assert_eq!(after.order.grand_total, dec!(120000));
}

#[tokio::test]
async fn menu_price_is_captured_at_order_time() {
    use sea_orm::{ActiveModelTrait, Set};
    use table_order_api::entities::menu_item;

    let app = TestApp::new().await;
    app.seed_table("T1").await;
    let soup = app.seed_menu_item("Tom Yum", dec!(50000), None).await;
    let session = app.session(&app.start_session("T1").await).await;
    let placed = app.place_order(&session, &[(soup.id, 1)]).await;

    let mut repriced: menu_item::ActiveModel = soup.into();
    repriced.price = Set(dec!(75000));
    repriced.update(&*app.state.db).await.unwrap();

    let fetched = app
        .state
        .orders
        .get_order(placed.order.id, &Caller::Customer(session))
        .await
        .unwrap();
    assert_eq!(fetched.items[0].unit_price, dec!(50000));
    assert_eq!(fetched.order.grand_total, dec!(57500));
}

#[tokio::test]
async fn kitchen_pipeline_rejects_going_backwards() {
    let app = TestApp::new().await;
    app.seed_table("T1").await;
    let soup = app.seed_menu_item("Tom Yum", dec!(50000), None).await;
    let session = app.session(&app.start_session("T1").await).await;
    let placed = app.place_order(&session, &[(soup.id, 1)]).await;

    for next in [
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Served,
        OrderStatus::Completed,
    ] {
        app.state.orders.update_order_status(placed.order.id, next).await.unwrap();
    }

    let err = app
        .state
        .orders
        .update_order_status(placed.order.id, OrderStatus::Preparing)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidTransition { ref from, ref to } if from == "completed" && to == "preparing"
    );
    assert_eq!(app.reload_order(placed.order.id).await.status, OrderStatus::Completed);
}

#[tokio::test]
async fn ready_order_pages_staff_and_table() {
    let app = TestApp::new().await;
    app.seed_table("T1").await;
    let soup = app.seed_menu_item("Tom Yum", dec!(50000), None).await;
    let session = app.session(&app.start_session("T1").await).await;
    let placed = app.place_order(&session, &[(soup.id, 1)]).await;

    app.state.orders.update_order_status(placed.order.id, OrderStatus::Confirmed).await.unwrap();
    app.state.orders.update_order_status(placed.order.id, OrderStatus::Preparing).await.unwrap();

    let mut table_feed = app.subscribe(Audience::Table(session.table_id));
    app.state.orders.update_order_status(placed.order.id, OrderStatus::Ready).await.unwrap();

    let first = next_broadcast(&mut table_feed).await.expect("status broadcast");
    assert_eq!(first.kind, BroadcastKind::OrderStatusUpdated);
    let second = next_broadcast(&mut table_feed).await.expect("ready broadcast");
    assert_eq!(second.kind, BroadcastKind::OrderReady);

    assert_eq!(app.notifications_of(NotificationKind::OrderReady).await.len(), 1);
}

#[tokio::test]
async fn item_status_follows_the_kitchen_flow() {
    let app = TestApp::new().await;
    app.seed_table("T1").await;
    let soup = app.seed_menu_item("Tom Yum", dec!(50000), None).await;
    let session = app.session(&app.start_session("T1").await).await;
    let placed = app.place_order(&session, &[(soup.id, 1)]).await;
    let item_id = placed.items[0].id;

    let response = app
        .staff_request(
            Method::PUT,
            &format!("/api/v1/order-items/{}/status", item_id),
            Some(json!({ "status": "preparing" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let item = app
        .state
        .orders
        .update_order_item_status(item_id, OrderItemStatus::Ready)
        .await
        .unwrap();
    assert_eq!(item.status, OrderItemStatus::Ready);

    let err = app
        .state
        .orders
        .update_order_item_status(item_id, OrderItemStatus::Pending)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });

    app.state
        .orders
        .update_order_item_status(item_id, OrderItemStatus::Served)
        .await
        .unwrap();

    // A served dish sent back can still be voided.
    let response = app
        .staff_request(
            Method::PUT,
            &format!("/api/v1/order-items/{}/status", item_id),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["data"]["status"], "cancelled");

    let err = app
        .state
        .orders
        .update_order_item_status(item_id, OrderItemStatus::Served)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
}

#[tokio::test]
async fn customers_cannot_read_other_tables_orders() {
    let app = TestApp::new().await;
    app.seed_table("T1").await;
    app.seed_table("T2").await;
    let soup = app.seed_menu_item("Tom Yum", dec!(50000), None).await;
    let owner = app.session(&app.start_session("T1").await).await;
    let neighbour = app.start_session("T2").await;
    let placed = app.place_order(&owner, &[(soup.id, 1)]).await;

    let uri = format!("/api/v1/orders/{}", placed.order.id);
    let response = app
        .customer_request(Method::GET, &uri, None, &neighbour.session_token)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .customer_request(Method::GET, &uri, None, &owner.session_token)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.staff_request(Method::GET, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn staff_listing_filters_by_status() {
    let app = TestApp::new().await;
    app.seed_table("T1").await;
    let soup = app.seed_menu_item("Tom Yum", dec!(50000), None).await;
    let session = app.session(&app.start_session("T1").await).await;
    let first = app.place_order(&session, &[(soup.id, 1)]).await;
    app.place_order(&session, &[(soup.id, 1)]).await;
    app.state.orders.update_order_status(first.order.id, OrderStatus::Confirmed).await.unwrap();

    let response = app
        .staff_request(Method::GET, "/api/v1/orders?status=confirmed", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], json!(first.order.id));

    let mine = app
        .customer_request(Method::GET, "/api/v1/orders/mine", None, &session.session_token)
        .await;
    let body = read_json(mine).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn empty_and_invalid_carts_are_rejected() {
    let app = TestApp::new().await;
    app.seed_table("T1").await;
    let soup = app.seed_menu_item("Tom Yum", dec!(50000), None).await;
    let started = app.start_session("T1").await;

    let empty = app
        .customer_request(Method::POST, "/api/v1/orders", Some(json!({ "items": [] })), &started.session_token)
        .await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let zero = app
        .customer_request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [{ "menu_item_id": soup.id, "quantity": 0 }] })),
            &started.session_token,
        )
        .await;
    assert_eq!(zero.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Untracked stock puts no ceiling on the line, so the cart must.
    let huge = app
        .customer_request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [{ "menu_item_id": soup.id, "quantity": 2_000_000_000 }] })),
            &started.session_token,
        )
        .await;
    assert_eq!(huge.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let unknown = app
        .customer_request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [{ "menu_item_id": uuid::Uuid::new_v4(), "quantity": 1 }] })),
            &started.session_token,
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}
