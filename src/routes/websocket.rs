use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{services::websocket_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/ws",
    tag = "seeds",
    responses((status = 101, description = "Switching protocols to the seed WebSocket"))
)]
/// Upgrade the HTTP connection into a seed client WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket))
}

/// Configure the WebSocket endpoints. The root path is kept for clients that
/// connect to the bare listener address.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
}
