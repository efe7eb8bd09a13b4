use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use agora_db::Database;
use agora_gateway::{Fanout, SessionStore};
use agora_types::api::{LoginRequest, RegisterRequest, SessionResponse, SessionSummary};
use agora_types::models::Session;

use crate::error::status_for;
use crate::middleware::{AuthUser, SESSION_COOKIE};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub sessions: SessionStore,
    pub fanout: Fanout,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Validate input
    let email = req.email.trim().to_lowercase();
    if !email.contains('@') || email.len() > 254 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let lookup = email.clone();
    let existing = state
        .fanout
        .blocking(move |db| db.get_user_by_email(&lookup))
        .await
        .map_err(status_for)?;
    if existing.is_some() {
        return Err(StatusCode::CONFLICT);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .to_string();

    let user_id = Uuid::new_v4();
    let first_name = req.first_name.trim().to_string();
    let last_name = req.last_name.trim().to_string();
    let nickname = req.nickname.filter(|n| !n.trim().is_empty());
    let display_name =
        agora_db::models::display_name_of(&first_name, &last_name, nickname.as_deref());

    state
        .fanout
        .blocking(move |db| {
            db.create_user(
                user_id,
                &email,
                &password_hash,
                &first_name,
                &last_name,
                nickname.as_deref(),
            )
        })
        .await
        .map_err(status_for)?;

    info!("Registered {} ({})", display_name, user_id);

    let session = open_session(&state, user_id).await?;
    let cookie = session_cookie(&session, &state.sessions);
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(session_response(session, display_name)),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let email = req.email.trim().to_lowercase();
    let user = state
        .fanout
        .blocking(move |db| db.get_user_by_email(&email))
        .await
        .map_err(status_for)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Verify password
    let parsed_hash =
        PasswordHash::new(&user.password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let user_id: Uuid = user.id.parse().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let session = open_session(&state, user_id).await?;
    let cookie = session_cookie(&session, &state.sessions);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(session_response(session, user.display_name())),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> impl IntoResponse {
    state.sessions.invalidate(&user.token).await;
    info!("{} logged out", user.user_id);

    let cleared = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE);
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cleared)])
}

/// Diagnostic listing, only mounted when enabled in config.
pub async fn debug_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    let now = Utc::now();
    let sessions = state
        .sessions
        .list_active()
        .await
        .into_iter()
        .map(|s| SessionSummary {
            expired: !s.is_valid_at(now),
            user_id: s.user_id,
            created_at: s.created_at,
            expires_at: s.expires_at,
        })
        .collect();
    Json(sessions)
}

async fn open_session(state: &AppState, user_id: Uuid) -> Result<Session, StatusCode> {
    state.sessions.create_session(user_id).await.map_err(|e| {
        error!("Session creation failed for {}: {}", user_id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn session_cookie(session: &Session, sessions: &SessionStore) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        session.token,
        sessions.ttl().num_seconds()
    )
}

fn session_response(session: Session, display_name: String) -> SessionResponse {
    SessionResponse {
        user_id: session.user_id,
        display_name,
        token: session.token,
        expires_at: session.expires_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes;
    use crate::test_support::{call, json, state};
    use serde_json::json;

    fn registration(email: &str) -> serde_json::Value {
        json!({
            "email": email,
            "password": "correct horse",
            "first_name": "Grace",
            "last_name": "Hopper",
        })
    }

    #[tokio::test]
    async fn register_then_login() {
        let state = state();
        let app = routes(state.clone());

        let (status, body) = call(&app, "POST", "/auth/register", None, Some(registration("Grace@Example.com"))).await;
        assert_eq!(status, StatusCode::CREATED);
        let registered: SessionResponse = json(&body);
        assert_eq!(registered.display_name, "Grace Hopper");
        assert_eq!(state.sessions.validate(&registered.token).await, Some(registered.user_id));

        let (status, body) = call(
            &app,
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "grace@example.com", "password": "correct horse"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let logged_in: SessionResponse = json(&body);
        assert_eq!(logged_in.user_id, registered.user_id);
        assert_ne!(logged_in.token, registered.token);
    }

    #[tokio::test]
    async fn rejects_bad_registrations_and_credentials() {
        let app = routes(state());

        let (status, _) = call(&app, "POST", "/auth/register", None, Some(registration("ada@example.com"))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = call(&app, "POST", "/auth/register", None, Some(registration("ada@example.com"))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let mut short = registration("bob@example.com");
        short["password"] = json!("short");
        let (status, _) = call(&app, "POST", "/auth/register", None, Some(short)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "ada@example.com", "password": "wrong password"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "nobody@example.com", "password": "whatever1"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_invalidates_the_session() {
        let state = state();
        let app = routes(state.clone());
        let (_, token) = crate::test_support::user(&state, "lin").await;

        let (status, _) = call(&app, "GET", "/notifications", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, "POST", "/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(&app, "GET", "/notifications", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, "POST", "/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn debug_listing_hides_tokens() {
        let state = state();
        let (user_id, token) = crate::test_support::user(&state, "dee").await;

        let Json(listing) = debug_sessions(State(state)).await;
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].user_id, user_id);
        assert!(!listing[0].expired);
        assert!(!serde_json::to_string(&listing).unwrap().contains(&token));
    }
}
