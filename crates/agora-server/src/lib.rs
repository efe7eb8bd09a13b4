pub mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use agora_api::auth::{self, AppState, AppStateInner};
use agora_api::middleware::authenticate;
use agora_db::Database;
use agora_gateway::{Fanout, Registry, SessionStore, connection};

pub fn build_state(db: Arc<Database>, sessions: SessionStore) -> AppState {
    let fanout = Fanout::new(db.clone(), Registry::new());
    Arc::new(AppStateInner { db, sessions, fanout })
}

pub fn build_router(state: AppState, debug_sessions: bool) -> Router {
    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let mut app = agora_api::routes(state.clone()).merge(ws_route);

    if debug_sessions {
        app = app.merge(
            Router::new()
                .route("/debug/sessions", get(auth::debug_sessions))
                .with_state(state),
        );
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// The session is checked before the upgrade; no socket is opened without one.
async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    match authenticate(&state.sessions, &headers).await {
        Ok(user) => {
            let fanout = state.fanout.clone();
            ws.on_upgrade(move |socket| connection::handle_connection(socket, fanout, user.user_id))
                .into_response()
        }
        Err(e) => {
            debug!("Rejected gateway upgrade: {}", e);
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}
