use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, Cookie, HeaderMapExt, authorization::Bearer};
use uuid::Uuid;

use agora_gateway::{GatewayError, SessionStore};

use crate::auth::AppState;

pub const SESSION_COOKIE: &str = "session_id";

/// The caller, as resolved from a valid session.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub token: String,
}

/// Bearer token first, then the `session_id` cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(auth.token().to_string());
    }

    headers
        .typed_get::<Cookie>()
        .and_then(|cookie| cookie.get(SESSION_COOKIE).map(str::to_string))
}

pub async fn authenticate(sessions: &SessionStore, headers: &HeaderMap) -> Result<AuthUser, GatewayError> {
    let token = session_token(headers).ok_or(GatewayError::Auth)?;
    let user_id = sessions.validate(&token).await.ok_or(GatewayError::Auth)?;
    Ok(AuthUser { user_id, token })
}

/// Resolve the session and stash the caller in request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let user = authenticate(&state.sessions, req.headers())
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header};

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session_id=from-cookie"));
        assert_eq!(session_token(&headers).as_deref(), Some("from-cookie"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(session_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn missing_credentials_yield_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(session_token(&headers), None);
    }

    #[tokio::test]
    async fn expired_or_unknown_tokens_fail() {
        let sessions = SessionStore::with_ttl(chrono::Duration::zero());
        let session = sessions.create_session(Uuid::new_v4()).await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", session.token)).unwrap(),
        );
        assert!(matches!(authenticate(&sessions, &headers).await, Err(GatewayError::Auth)));
        assert!(matches!(authenticate(&sessions, &HeaderMap::new()).await, Err(GatewayError::Auth)));
    }
}
