use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::catalog::{DesignList, DesignView},
    error::{AppError, AppResult},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_designs))
        .route("/{id}", get(get_design))
}

#[utoipa::path(
    get,
    path = "/api/designs",
    responses(
        (status = 200, description = "Every design on sale", body = ApiResponse<DesignList>)
    ),
    tag = "Catalog"
)]
pub async fn list_designs(State(state): State<AppState>) -> Json<ApiResponse<DesignList>> {
    let items: Vec<DesignView> = state.catalog.designs().map(DesignView::from).collect();
    let meta = Meta::count(items.len());
    Json(ApiResponse::success("OK", DesignList { items }, Some(meta)))
}

#[utoipa::path(
    get,
    path = "/api/designs/{id}",
    params(("id" = String, Path, description = "Design ID")),
    responses(
        (status = 200, description = "One design", body = ApiResponse<DesignView>),
        (status = 404, description = "Design not found")
    ),
    tag = "Catalog"
)]
pub async fn get_design(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<DesignView>>> {
    let design = state.catalog.get(&id).ok_or(AppError::NotFound)?;
    Ok(Json(ApiResponse::success(
        "OK",
        DesignView::from(design),
        Some(Meta::empty()),
    )))
}
