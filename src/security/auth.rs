use std::sync::Arc;

use axum::{
    Extension, async_trait,
    extract::{FromRequestParts, OriginalUri, Request},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::errors::AppError;
use crate::logging::{LoggableUuid, SecurityEvent};
use crate::models::session::Session;
use crate::repo::SessionStore;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "sessionid";
pub const LOGIN_PATH: &str = "/login/";
pub const DEFAULT_REDIRECT: &str = "/notes/";

/// Identity of the caller, inserted by [`require_login`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    /// Id of the stored [`Session`] record.
    pub sid: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// Signs and verifies session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionKeys {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
        }
    }

    pub fn issue_token(&self, session: &Session) -> Result<String, AppError> {
        let claims = Claims {
            sub: session.user_id,
            sid: session.id,
            iat: session.created_at.timestamp() as usize,
            exp: session.expires_at.timestamp() as usize,
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    pub fn decode_token(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .ok()
    }
}

/// Starts, resolves and ends logins. The cookie carries a signed token
/// naming a stored session; deleting the record ends the session even if
/// the cookie is replayed.
#[derive(Clone)]
pub struct Sessions {
    keys: SessionKeys,
    store: Arc<dyn SessionStore>,
    ttl: ChronoDuration,
    secure_cookie: bool,
}

impl Sessions {
    pub fn new(config: &SessionConfig, store: Arc<dyn SessionStore>) -> Self {
        Self {
            keys: SessionKeys::new(config),
            store,
            ttl: config.ttl,
            secure_cookie: config.secure_cookie,
        }
    }

    /// The user behind the session cookie, if its token verifies and its
    /// record is still stored.
    pub async fn current_user(&self, jar: &CookieJar) -> Result<Option<Uuid>, AppError> {
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(None);
        };

        let Some(claims) = self.keys.decode_token(cookie.value()) else {
            crate::log_security_event!(
                SecurityEvent::SessionRejected,
                reason = "invalid_or_expired_token",
                "Session cookie rejected"
            );
            return Ok(None);
        };

        match self.store.get(claims.sid).await? {
            Some(session) if session.user_id == claims.sub => Ok(Some(session.user_id)),
            _ => {
                crate::log_security_event!(
                    SecurityEvent::SessionRejected,
                    user_id = %LoggableUuid(claims.sub),
                    reason = "session_ended",
                    "Session cookie rejected"
                );
                Ok(None)
            }
        }
    }

    pub async fn start(&self, jar: CookieJar, user_id: Uuid) -> Result<CookieJar, AppError> {
        let session = Session::new(user_id, Utc::now(), self.ttl);
        let token = self.keys.issue_token(&session)?;
        self.store.insert(session).await?;

        let cookie = Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie);

        tracing::debug!(user_id = %LoggableUuid(user_id), "Session started");
        Ok(jar.add(cookie))
    }

    /// Deletes the record behind the cookie and asks the browser to drop it.
    pub async fn end(&self, jar: CookieJar) -> Result<CookieJar, AppError> {
        let claims = jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| self.keys.decode_token(cookie.value()));
        if let Some(claims) = claims {
            self.store.delete(claims.sid).await?;
        }

        Ok(jar.remove(Cookie::build(SESSION_COOKIE).path("/")))
    }

    /// Ends every session of `user_id` and hands the caller a fresh one.
    pub async fn rotate(&self, jar: CookieJar, user_id: Uuid) -> Result<CookieJar, AppError> {
        let ended = self.store.delete_for_user(user_id).await?;
        tracing::debug!(user_id = %LoggableUuid(user_id), ended, "Sessions rotated");
        self.start(jar, user_id).await
    }
}

/// Redirect to the login page that brings the user back to `next` afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRedirect {
    pub next: String,
}

impl IntoResponse for AuthRedirect {
    fn into_response(self) -> Response {
        Redirect::to(&login_url(&self.next)).into_response()
    }
}

pub fn login_url(next: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();
    format!("{LOGIN_PATH}?{query}")
}

/// Guards every route it layers: requests without a valid session are sent
/// to the login page with their original path and query as `next`.
pub async fn require_login(
    Extension(state): Extension<AppState>,
    OriginalUri(uri): OriginalUri,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let user_id = match state.sessions.current_user(&jar).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            let next = uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| uri.path().to_string());
            tracing::debug!(path = %uri.path(), "Unauthenticated request redirected to login");
            return AuthRedirect { next }.into_response();
        }
        Err(err) => return err.into_response(),
    };

    request.extensions_mut().insert(AuthenticatedUser(user_id));
    next.run(request).await
}

/// Accepts only local absolute paths, so `next` can never send the user off-site.
pub fn safe_next(candidate: &str) -> Option<&str> {
    let candidate = candidate.trim();
    let is_local = candidate.starts_with('/')
        && !candidate.starts_with("//")
        && !candidate.contains('\\')
        && !candidate.chars().any(char::is_control);
    is_local.then_some(candidate)
}

pub fn redirect_target(next: Option<&str>) -> String {
    match next.map(str::trim).filter(|next| !next.is_empty()) {
        None => DEFAULT_REDIRECT.to_string(),
        Some(candidate) => match safe_next(candidate) {
            Some(path) => path.to_string(),
            None => {
                crate::log_security_event!(
                    SecurityEvent::UnsafeRedirectRejected,
                    "Ignoring non-local redirect target"
                );
                DEFAULT_REDIRECT.to_string()
            }
        },
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .copied()
            .ok_or(AppError::MissingIdentity)
    }
}
