use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::checkout::{CaptureRequest, CaptureResponse, CheckoutOrderResponse},
    error::AppResult,
    middleware::{auth::MaybeUser, session::SessionId},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/order", post(create_order))
        .route("/capture", post(capture_order))
}

#[utoipa::path(
    post,
    path = "/api/checkout/order",
    params(("x-session-id" = String, Header, description = "Session id (or `sid` cookie)")),
    responses(
        (status = 200, description = "Payment order created from the cart", body = ApiResponse<CheckoutOrderResponse>),
        (status = 400, description = "Cart is empty"),
        (status = 401, description = "No session"),
        (status = 502, description = "Payment processor unavailable")
    ),
    tag = "Checkout"
)]
pub async fn create_order(
    State(state): State<AppState>,
    session: SessionId,
) -> AppResult<Json<ApiResponse<CheckoutOrderResponse>>> {
    let started = state.checkout.begin(session.as_str()).await?;
    let data = CheckoutOrderResponse {
        external_order_id: started.external_order.id,
        status: started.external_order.status,
        approve_url: started.external_order.approve_url,
        cart: started.cart,
    };
    Ok(Json(ApiResponse::success("Payment order created", data, Some(Meta::empty()))))
}

#[utoipa::path(
    post,
    path = "/api/checkout/capture",
    params(("x-session-id" = String, Header, description = "Session id (or `sid` cookie)")),
    request_body = CaptureRequest,
    responses(
        (status = 200, description = "Payment captured and order recorded", body = ApiResponse<CaptureResponse>),
        (status = 202, description = "Payment pending at the processor; cart preserved"),
        (status = 400, description = "No checkout in progress for this order"),
        (status = 401, description = "No session"),
        (status = 402, description = "Payment denied; cart preserved"),
        (status = 404, description = "Order was placed by another session or account"),
        (status = 502, description = "Payment processor unavailable")
    ),
    security((), ("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn capture_order(
    State(state): State<AppState>,
    session: SessionId,
    user: MaybeUser,
    Json(payload): Json<CaptureRequest>,
) -> AppResult<Json<ApiResponse<CaptureResponse>>> {
    let result = state
        .checkout
        .capture(session.as_str(), &user.order_owner(), &payload.external_order_id)
        .await?;
    let message = if result.fulfillment_error.is_some() {
        "Payment received, downloads will follow"
    } else {
        "Payment received"
    };
    let data = CaptureResponse {
        order: result.order,
        grants: result.grants,
        fulfillment_error: result.fulfillment_error,
    };
    Ok(Json(ApiResponse::success(message, data, Some(Meta::empty()))))
}
