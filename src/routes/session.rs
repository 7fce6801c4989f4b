use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
};
use uuid::Uuid;

use crate::{
    dto::catalog::SessionIssued,
    middleware::session::session_cookie,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(issue_session))
}

#[utoipa::path(
    post,
    path = "/api/session",
    responses(
        (status = 200, description = "Fresh session id, also set as the `sid` cookie", body = ApiResponse<SessionIssued>)
    ),
    tag = "Session"
)]
pub async fn issue_session(State(state): State<AppState>) -> Response {
    let session_id = Uuid::new_v4().to_string();
    let cookie = session_cookie(&session_id, state.session_ttl_secs);
    tracing::debug!(session_id = %session_id, "session issued");
    (
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::success(
            "Session created",
            SessionIssued { session_id },
            Some(Meta::empty()),
        )),
    )
        .into_response()
}
