use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use agora_types::models::Notification;

use crate::auth::AppState;
use crate::error::status_for;
use crate::middleware::AuthUser;

/// Newest first, read and unread alike.
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Notification>>, StatusCode> {
    let user_id = user.user_id;
    let notifications = state
        .fanout
        .blocking(move |db| db.notifications_for_user(user_id))
        .await
        .map_err(status_for)?;
    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(notification_id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let user_id = user.user_id;
    let updated = state
        .fanout
        .blocking(move |db| db.mark_notification_read(notification_id, user_id))
        .await
        .map_err(status_for)?;

    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[cfg(test)]
mod tests {
    use crate::routes;
    use crate::test_support::{call, json, state, user};
    use agora_types::models::{Notification, NotificationKind};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn only_the_owner_can_mark_read() {
        let state = state();
        let app = routes(state.clone());
        let (alice, alice_token) = user(&state, "alice").await;
        let (_, bob_token) = user(&state, "bob").await;

        let n = Notification::new(alice, NotificationKind::GroupEvent, "hello".into(), uuid::Uuid::new_v4());
        state
            .db
            .with_conn(|c| agora_db::queries::insert_notification(c, &n))
            .unwrap();

        let uri = format!("/notifications/{}/read", n.id);
        let (status, _) = call(&app, "POST", &uri, Some(&bob_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "POST", &uri, Some(&alice_token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(&app, "GET", "/notifications", Some(&alice_token), None).await;
        assert_eq!(status, StatusCode::OK);
        let listed: Vec<Notification> = json(&body);
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_read);
    }

    #[tokio::test]
    async fn requires_a_session() {
        let app = routes(state());
        let (status, _) = call(&app, "GET", "/notifications", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, "GET", "/notifications", Some("forged"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
