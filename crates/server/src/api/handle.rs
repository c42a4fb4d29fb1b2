use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;

/// `POST /` -- run one batch through the dispatcher.
///
/// The body is taken raw so malformed requests still get a JSON error
/// reply and a terminal log event rather than an extractor rejection.
pub async fn handle(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let response = state.dispatcher.handle(&body).await;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(response.body))
}
