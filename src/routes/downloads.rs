use axum::{
    Router,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{error::AppResult, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/{grant_id}", get(download))
}

#[utoipa::path(
    get,
    path = "/api/downloads/{grant_id}",
    params(("grant_id" = Uuid, Path, description = "Download grant ID")),
    responses(
        (status = 200, description = "The purchased file", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown grant"),
        (status = 410, description = "Grant already used or expired")
    ),
    tag = "Downloads"
)]
pub async fn download(
    State(state): State<AppState>,
    Path(grant_id): Path<Uuid>,
) -> AppResult<Response> {
    let download = state.dispatcher.redeem(grant_id, Utc::now()).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file_name.replace('"', "")
    );
    Ok((
        [
            (header::CONTENT_TYPE, download.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        download.bytes,
    )
        .into_response())
}
