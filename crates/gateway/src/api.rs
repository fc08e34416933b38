//! HTTP surface: signaling plus the static reference client.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

use crate::rtc::SessionDescription;
use crate::session;
use crate::state::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    let static_dir = &state.config.server.static_dir;
    Router::new()
        .route("/offer", post(offer))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .route_service("/client.js", ServeFile::new(static_dir.join("client.js")))
        .layer(TraceLayer::new_for_http())
}

/// `POST /offer` — negotiate one peer and assemble its session. The
/// response body is the local answer `{sdp, type}`.
async fn offer(
    State(state): State<AppState>,
    Json(offer): Json<SessionDescription>,
) -> Result<Json<SessionDescription>, (StatusCode, String)> {
    match session::start(&state, offer).await {
        Ok((answer, session)) => {
            tracing::info!(peer_id = session.peer_id, "session established");
            Ok(Json(answer))
        }
        Err(e) => {
            tracing::error!(error = %e, "session negotiation failed");
            Err((StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}
