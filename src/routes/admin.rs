use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch, post},
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    dto::orders::{GrantList, OrderWithGrants, UpdateOrderStatusRequest},
    error::AppResult,
    middleware::auth::{AuthUser, ensure_admin},
    models::Order,
    response::{ApiResponse, Meta},
    services::sweep::SweepReport,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}", get(get_order_admin))
        .route("/orders/{id}/status", patch(update_order_status))
        .route("/orders/{id}/dispatch", post(dispatch_order))
        .route("/sweep", post(run_sweep))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Any order with its grants", body = ApiResponse<OrderWithGrants>),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn get_order_admin(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithGrants>>> {
    ensure_admin(&user)?;
    let order = state.ledger.get(id).await?;
    let grants = state.ledger.store().grants_for_order(id).await?;
    Ok(Json(ApiResponse::success(
        "OK",
        OrderWithGrants { order, grants },
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    patch,
    path = "/api/admin/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status moved forward", body = ApiResponse<Order>),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Transition not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    ensure_admin(&user)?;
    let order = state.ledger.update_status(id, payload.status).await?;
    tracing::info!(order_id = %id, admin = %user.user_id, status = %order.status, "admin status change");
    Ok(Json(ApiResponse::success("Order updated", order, Some(Meta::empty()))))
}

#[utoipa::path(
    post,
    path = "/api/admin/orders/{id}/dispatch",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Grants issued and delivered, order fulfilled", body = ApiResponse<GrantList>),
        (status = 403, description = "Not an admin"),
        (status = 409, description = "Order is not paid"),
        (status = 500, description = "A purchased asset is missing; order stays paid"),
        (status = 502, description = "Delivery failed; order stays paid")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn dispatch_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<GrantList>>> {
    ensure_admin(&user)?;
    let order = state.ledger.get(id).await?;
    let items = state.dispatcher.dispatch(&order).await?;
    let meta = Meta::count(items.len());
    Ok(Json(ApiResponse::success("Order dispatched", GrantList { items }, Some(meta))))
}

#[utoipa::path(
    post,
    path = "/api/admin/sweep",
    responses(
        (status = 200, description = "Stale pending orders cancelled, expired sessions purged", body = ApiResponse<SweepReport>),
        (status = 403, description = "Not an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn run_sweep(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<SweepReport>>> {
    ensure_admin(&user)?;
    let report = state.sweeper.run_once(Utc::now()).await?;
    Ok(Json(ApiResponse::success("Sweep finished", report, Some(Meta::empty()))))
}
