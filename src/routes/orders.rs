use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::orders::{OrderList, OrderWithGrants},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/{id}", get(get_order))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    responses(
        (status = 200, description = "Caller's orders, newest first", body = ApiResponse<OrderList>),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let items = state.ledger.get_user_orders(&user.order_owner()).await?;
    let meta = Meta::count(items.len());
    Ok(Json(ApiResponse::success("OK", OrderList { items }, Some(meta))))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with its download grants", body = ApiResponse<OrderWithGrants>),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithGrants>>> {
    let order = state.ledger.get(id).await?;
    // Other users' orders look the same as missing ones.
    if order.user_id != user.order_owner() {
        return Err(AppError::OrderNotFound);
    }
    let grants = state.ledger.store().grants_for_order(order.id).await?;
    Ok(Json(ApiResponse::success(
        "OK",
        OrderWithGrants { order, grants },
        Some(Meta::empty()),
    )))
}
