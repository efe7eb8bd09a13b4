pub mod auth;
pub mod error;
pub mod groups;
pub mod messages;
pub mod middleware;
pub mod notifications;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// Every HTTP route except the gateway upgrade and diagnostics.
pub fn routes(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/notifications", get(notifications::list))
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .route("/messages/private", post(messages::send_private))
        .route("/messages/private/{other_id}", get(messages::private_history))
        .route("/messages/unread", get(messages::unread_senders))
        .route("/groups", post(groups::create_group))
        .route("/groups/{group_id}/invite", post(groups::invite))
        .route("/groups/{group_id}/join", post(groups::request_join))
        .route("/groups/{group_id}/respond", post(groups::respond))
        .route("/groups/{group_id}/events", post(groups::create_event))
        .route(
            "/groups/{group_id}/messages",
            get(messages::group_history).post(messages::send_group),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
