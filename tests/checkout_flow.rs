mod common;

use std::sync::atomic::Ordering;

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
};
use lyric_storefront::{
    dto::{
        cart::{AddToCartRequest, CartLineKey, SetQuantityRequest},
        checkout::CaptureRequest,
        orders::UpdateOrderStatusRequest,
    },
    error::AppError,
    middleware::{
        auth::{AuthUser, MaybeUser},
        session::SessionId,
    },
    models::{Cart, OrderStatus},
    payment::CaptureStatus,
    routes::{admin, cart, checkout, downloads, orders},
};
use rust_decimal::Decimal;
use uuid::Uuid;

use common::{TestApp, test_app};

fn session(id: &str) -> SessionId {
    SessionId(id.to_string())
}

fn admin_user() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: "admin".into(),
    }
}

async fn add(app: &TestApp, sid: &str, design_id: &str, format: &str, quantity: i64) -> Cart {
    cart::add_item(
        State(app.state.clone()),
        session(sid),
        Json(AddToCartRequest {
            design_id: design_id.into(),
            format: format.into(),
            price: None,
            quantity: Some(quantity),
        }),
    )
    .await
    .unwrap()
    .0
    .data
    .unwrap()
}

async fn begin(app: &TestApp, sid: &str) -> String {
    checkout::create_order(State(app.state.clone()), session(sid))
        .await
        .unwrap()
        .0
        .data
        .unwrap()
        .external_order_id
}

async fn capture(
    app: &TestApp,
    sid: &str,
    user: MaybeUser,
    external_order_id: &str,
) -> Result<lyric_storefront::dto::checkout::CaptureResponse, AppError> {
    checkout::capture_order(
        State(app.state.clone()),
        session(sid),
        user,
        Json(CaptureRequest {
            external_order_id: external_order_id.into(),
        }),
    )
    .await
    .map(|resp| resp.0.data.unwrap())
}

#[tokio::test]
async fn cart_to_download_happy_path() {
    let app = test_app();

    add(&app, "s1", "x", "svg", 1).await;
    let cart = add(&app, "s1", "y", "PNG", 2).await;
    assert_eq!(cart.total, Decimal::new(900, 2));
    assert_eq!(cart.item_count, 3);

    let external_order_id = begin(&app, "s1").await;
    let captured = capture(&app, "s1", MaybeUser(None), &external_order_id)
        .await
        .unwrap();

    assert_eq!(captured.order.status, OrderStatus::Fulfilled);
    assert_eq!(captured.order.user_id, "guest");
    assert_eq!(captured.order.total, Decimal::new(900, 2));
    assert_eq!(captured.grants.len(), 3);
    assert!(captured.fulfillment_error.is_none());

    let cart = cart::get_cart(State(app.state.clone()), session("s1"))
        .await
        .unwrap()
        .0
        .data
        .unwrap();
    assert!(cart.is_empty());

    let svg_grant = captured
        .grants
        .iter()
        .find(|g| g.format == "SVG")
        .unwrap()
        .id;
    let response = downloads::download(State(app.state.clone()), Path(svg_grant))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/svg+xml");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"bytes of x/design.svg");

    let err = downloads::download(State(app.state.clone()), Path(svg_grant))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::GrantUnavailable));
    assert_eq!(err.status_code(), StatusCode::GONE);
}

#[tokio::test]
async fn catalog_price_wins_over_client_price() {
    let app = test_app();
    let cart = cart::add_item(
        State(app.state.clone()),
        session("s1"),
        Json(AddToCartRequest {
            design_id: "x".into(),
            format: "SVG".into(),
            price: Some(Decimal::new(1, 2)),
            quantity: None,
        }),
    )
    .await
    .unwrap()
    .0
    .data
    .unwrap();

    assert_eq!(cart.items[0].unit_price, Decimal::new(300, 2));
    assert_eq!(cart.items[0].quantity, 1);
}

#[tokio::test]
async fn unknown_design_or_format_is_invalid_input() {
    let app = test_app();
    for (design_id, format) in [("nope", "SVG"), ("y", "SVG")] {
        let err = cart::add_item(
            State(app.state.clone()),
            session("s1"),
            Json(AddToCartRequest {
                design_id: design_id.into(),
                format: format.into(),
                price: None,
                quantity: Some(1),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn quantity_updates_and_removal_keep_totals_derived() {
    let app = test_app();
    add(&app, "s1", "x", "SVG", 1).await;
    add(&app, "s1", "x", "SVG", 2).await;
    add(&app, "s1", "y", "PNG", 1).await;

    let cart = cart::set_item_quantity(
        State(app.state.clone()),
        session("s1"),
        Json(SetQuantityRequest {
            design_id: "x".into(),
            format: "SVG".into(),
            quantity: 5,
        }),
    )
    .await
    .unwrap()
    .0
    .data
    .unwrap();
    assert_eq!(cart.items.len(), 2);
    assert_eq!(cart.item_count, 6);
    assert_eq!(cart.total, Decimal::new(1800, 2));

    let cart = cart::remove_item(
        State(app.state.clone()),
        session("s1"),
        Json(CartLineKey {
            design_id: "y".into(),
            format: "PNG".into(),
        }),
    )
    .await
    .unwrap()
    .0
    .data
    .unwrap();
    assert_eq!(cart.item_count, 5);
    assert_eq!(cart.total, Decimal::new(1500, 2));

    let status = cart::clear_cart(State(app.state.clone()), session("s1"))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn empty_cart_checkout_creates_no_external_order() {
    let app = test_app();
    let err = checkout::create_order(State(app.state.clone()), session("s1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::EmptyCart));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(app.gateway.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn denied_capture_preserves_cart_and_creates_no_order() {
    let app = test_app();
    add(&app, "s1", "x", "SVG", 1).await;
    add(&app, "s1", "y", "PNG", 2).await;
    let external_order_id = begin(&app, "s1").await;

    app.gateway.set_status(CaptureStatus::Denied);
    let err = capture(&app, "s1", MaybeUser(None), &external_order_id)
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(app.orders.order_count().await, 0);
    let cart = app.state.carts.get("s1").await.unwrap();
    assert_eq!(cart.item_count, 3);
    assert_eq!(cart.total, Decimal::new(900, 2));
}

#[tokio::test]
async fn duplicate_capture_returns_the_same_order() {
    let app = test_app();
    add(&app, "s1", "x", "SVG", 1).await;
    let external_order_id = begin(&app, "s1").await;

    let first = capture(&app, "s1", MaybeUser(None), &external_order_id)
        .await
        .unwrap();
    let second = capture(&app, "s1", MaybeUser(None), &external_order_id)
        .await
        .unwrap();

    assert_eq!(first.order.id, second.order.id);
    assert_eq!(first.grants, second.grants);
    assert_eq!(app.orders.order_count().await, 1);
    assert_eq!(app.gateway.captured.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeated_capture_from_another_session_reveals_nothing() {
    let app = test_app();
    add(&app, "buyer", "x", "SVG", 1).await;
    let external_order_id = begin(&app, "buyer").await;
    let placed = capture(&app, "buyer", MaybeUser(None), &external_order_id)
        .await
        .unwrap();
    let grant_id = placed.grants[0].id;

    for (sid, user) in [
        ("stranger", MaybeUser(None)),
        (
            "stranger",
            MaybeUser(Some(AuthUser {
                user_id: Uuid::new_v4(),
                role: "user".into(),
            })),
        ),
        ("", MaybeUser(None)),
    ] {
        let err = capture(&app, sid, user, &external_order_id)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
    assert_eq!(app.gateway.captured.load(Ordering::SeqCst), 1);

    let response = downloads::download(State(app.state.clone()), Path(grant_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn signed_in_buyer_can_repeat_capture_from_a_new_session() {
    let app = test_app();
    let buyer = AuthUser {
        user_id: Uuid::new_v4(),
        role: "user".into(),
    };
    add(&app, "laptop", "y", "PNG", 1).await;
    let external_order_id = begin(&app, "laptop").await;
    let first = capture(&app, "laptop", MaybeUser(Some(buyer.clone())), &external_order_id)
        .await
        .unwrap();

    let again = capture(&app, "phone", MaybeUser(Some(buyer)), &external_order_id)
        .await
        .unwrap();
    assert_eq!(again.order.id, first.order.id);
    assert_eq!(again.grants, first.grants);
}

#[tokio::test]
async fn missing_pdf_keeps_order_paid_until_asset_is_restored() {
    let app = test_app();
    add(&app, "s1", "x", "SVG", 1).await;
    add(&app, "s1", "x", "PDF", 1).await;
    let external_order_id = begin(&app, "s1").await;
    std::fs::remove_file(app.asset("x/design.pdf")).unwrap();

    let captured = capture(&app, "s1", MaybeUser(None), &external_order_id)
        .await
        .unwrap();
    assert_eq!(captured.order.status, OrderStatus::Paid);
    assert!(captured.grants.is_empty());
    assert!(captured.fulfillment_error.is_some());

    let admin = admin_user();
    let err = admin::dispatch_order(
        State(app.state.clone()),
        admin.clone(),
        Path(captured.order.id),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::AssetMissing { ref format, .. } if format == "PDF"));

    std::fs::write(app.asset("x/design.pdf"), "restored").unwrap();
    let grants = admin::dispatch_order(State(app.state.clone()), admin, Path(captured.order.id))
        .await
        .unwrap()
        .0
        .data
        .unwrap()
        .items;

    assert_eq!(grants.len(), 2);
    assert!(grants.iter().any(|g| g.format == "SVG"));
    let order = app.state.ledger.get(captured.order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Fulfilled);
}

#[tokio::test]
async fn pending_capture_is_settled_by_an_admin() {
    let app = test_app();
    add(&app, "s1", "y", "PNG", 1).await;
    let external_order_id = begin(&app, "s1").await;

    app.gateway.set_status(CaptureStatus::Pending);
    let err = capture(&app, "s1", MaybeUser(None), &external_order_id)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::ACCEPTED);
    assert_eq!(app.state.carts.get("s1").await.unwrap().item_count, 1);

    let order = app
        .state
        .ledger
        .find_by_external_order(&external_order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    let admin = admin_user();
    let err = admin::dispatch_order(State(app.state.clone()), admin.clone(), Path(order.id))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::CONFLICT);

    admin::update_order_status(
        State(app.state.clone()),
        admin.clone(),
        Path(order.id),
        Json(UpdateOrderStatusRequest {
            status: OrderStatus::Paid,
        }),
    )
    .await
    .unwrap();
    let grants = admin::dispatch_order(State(app.state.clone()), admin, Path(order.id))
        .await
        .unwrap()
        .0
        .data
        .unwrap()
        .items;
    assert_eq!(grants.len(), 1);
}

#[tokio::test]
async fn backward_transitions_are_conflicts() {
    let app = test_app();
    add(&app, "s1", "x", "SVG", 1).await;
    let external_order_id = begin(&app, "s1").await;
    let order = capture(&app, "s1", MaybeUser(None), &external_order_id)
        .await
        .unwrap()
        .order;

    let err = admin::update_order_status(
        State(app.state.clone()),
        admin_user(),
        Path(order.id),
        Json(UpdateOrderStatusRequest {
            status: OrderStatus::Paid,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    let app = test_app();
    let user = AuthUser {
        user_id: Uuid::new_v4(),
        role: "user".into(),
    };
    let err = admin::run_sweep(State(app.state.clone()), user)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn order_history_belongs_to_the_signed_in_user() {
    let app = test_app();
    let buyer = AuthUser {
        user_id: Uuid::new_v4(),
        role: "user".into(),
    };

    let mut placed = Vec::new();
    for sid in ["s1", "s2"] {
        add(&app, sid, "x", "SVG", 1).await;
        let external_order_id = begin(&app, sid).await;
        let order = capture(&app, sid, MaybeUser(Some(buyer.clone())), &external_order_id)
            .await
            .unwrap()
            .order;
        placed.push(order.id);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let history = orders::list_orders(State(app.state.clone()), buyer.clone())
        .await
        .unwrap()
        .0
        .data
        .unwrap()
        .items;
    let ids: Vec<Uuid> = history.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![placed[1], placed[0]]);

    let detail = orders::get_order(State(app.state.clone()), buyer, Path(placed[0]))
        .await
        .unwrap()
        .0
        .data
        .unwrap();
    assert_eq!(detail.grants.len(), 1);

    let stranger = AuthUser {
        user_id: Uuid::new_v4(),
        role: "user".into(),
    };
    let err = orders::get_order(State(app.state.clone()), stranger, Path(placed[0]))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}
