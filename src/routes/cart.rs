use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::cart::{AddToCartRequest, CartLineKey, SetQuantityRequest},
    error::{AppError, AppResult},
    middleware::session::SessionId,
    models::Cart,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route(
            "/items",
            post(add_item)
                .patch(set_item_quantity)
                .delete(remove_item),
        )
}

#[utoipa::path(
    get,
    path = "/api/cart",
    params(("x-session-id" = String, Header, description = "Session id (or `sid` cookie)")),
    responses(
        (status = 200, description = "Current cart for the session", body = ApiResponse<Cart>),
        (status = 401, description = "No session")
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    session: SessionId,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let cart = state.carts.get(session.as_str()).await?;
    Ok(Json(ApiResponse::success("OK", cart, Some(Meta::empty()))))
}

#[utoipa::path(
    post,
    path = "/api/cart/items",
    params(("x-session-id" = String, Header, description = "Session id (or `sid` cookie)")),
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Item added; same design and format merge", body = ApiResponse<Cart>),
        (status = 400, description = "Invalid design, format or quantity"),
        (status = 401, description = "No session")
    ),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    session: SessionId,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let design_id = payload.design_id.trim();
    let format = payload.format.trim().to_ascii_uppercase();
    let design = state
        .catalog
        .get(design_id)
        .ok_or_else(|| AppError::InvalidInput(format!("unknown design {design_id}")))?;
    if !design.offers(&format) {
        return Err(AppError::InvalidInput(format!(
            "design {design_id} is not sold as {format}"
        )));
    }
    if let Some(claimed) = payload.price.filter(|p| *p != design.price) {
        tracing::warn!(
            session_id = session.as_str(),
            design_id,
            claimed = %claimed,
            catalog = %design.price,
            "client price ignored"
        );
    }

    let cart = state
        .carts
        .add(
            session.as_str(),
            design_id,
            &format,
            design.price,
            payload.quantity.unwrap_or(1),
        )
        .await?;
    Ok(Json(ApiResponse::success("Added to cart", cart, Some(Meta::empty()))))
}

#[utoipa::path(
    patch,
    path = "/api/cart/items",
    params(("x-session-id" = String, Header, description = "Session id (or `sid` cookie)")),
    request_body = SetQuantityRequest,
    responses(
        (status = 200, description = "Quantity set; zero or less removes the line", body = ApiResponse<Cart>),
        (status = 400, description = "Quantity above the cap"),
        (status = 401, description = "No session")
    ),
    tag = "Cart"
)]
pub async fn set_item_quantity(
    State(state): State<AppState>,
    session: SessionId,
    Json(payload): Json<SetQuantityRequest>,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let cart = state
        .carts
        .set_quantity(
            session.as_str(),
            &payload.design_id,
            &payload.format,
            payload.quantity,
        )
        .await?;
    Ok(Json(ApiResponse::success("Cart updated", cart, Some(Meta::empty()))))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items",
    params(("x-session-id" = String, Header, description = "Session id (or `sid` cookie)")),
    request_body = CartLineKey,
    responses(
        (status = 200, description = "Line removed if present", body = ApiResponse<Cart>),
        (status = 401, description = "No session")
    ),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    session: SessionId,
    Json(payload): Json<CartLineKey>,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let cart = state
        .carts
        .remove(session.as_str(), &payload.design_id, &payload.format)
        .await?;
    Ok(Json(ApiResponse::success("Removed from cart", cart, Some(Meta::empty()))))
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    params(("x-session-id" = String, Header, description = "Session id (or `sid` cookie)")),
    responses(
        (status = 204, description = "Cart cleared"),
        (status = 401, description = "No session")
    ),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    session: SessionId,
) -> AppResult<StatusCode> {
    state.carts.clear(session.as_str()).await?;
    Ok(StatusCode::NO_CONTENT)
}
