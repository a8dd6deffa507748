use axum::{
    Extension, Json, Router, middleware,
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::logging::{LoggableUuid, SecurityEvent};
use crate::models::FieldErrors;
use crate::models::user::{LoginForm, ProfileForm, RegistrationForm};
use crate::security::auth::{
    AuthenticatedUser, LOGIN_PATH, redirect_target, safe_next,
};
use crate::security::form::ValidatedForm;
use crate::security::rate_limit::{RateLimiterState, TrustedProxies, enforce_rate_limit};
use crate::state::AppState;

pub fn router(proxies: TrustedProxies) -> Router {
    Router::new()
        .route(
            "/register/",
            get(register_form).merge(post(register).layer(middleware::from_fn_with_state(
                RateLimiterState::registration(proxies.clone()),
                enforce_rate_limit,
            ))),
        )
        .route(
            "/login/",
            get(login_form).merge(post(login).layer(middleware::from_fn_with_state(
                RateLimiterState::login(proxies),
                enforce_rate_limit,
            ))),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginSubmission {
    #[serde(flatten)]
    form: LoginForm,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegistrationSubmission {
    #[serde(flatten)]
    form: RegistrationForm,
    next: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginPage {
    username: String,
    errors: FieldErrors,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    non_field_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegistrationPage {
    form: ProfileForm,
    errors: FieldErrors,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

/// `next` from the form body wins over the query string.
fn pick_next(body: Option<String>, query: Option<String>) -> Option<String> {
    let present = |next: &String| !next.trim().is_empty();
    body.filter(present).or(query.filter(present))
}

/// Only local targets are carried into the rendered page.
fn echo_next(next: Option<String>) -> Option<String> {
    next.filter(|next| safe_next(next).is_some())
}

pub async fn login_form(
    Extension(state): Extension<AppState>,
    Query(query): Query<NextQuery>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if state.sessions.current_user(&jar).await?.is_some() {
        return Ok(Redirect::to(&redirect_target(query.next.as_deref())).into_response());
    }

    Ok(Json(LoginPage {
        username: String::new(),
        errors: FieldErrors::new(),
        non_field_errors: Vec::new(),
        next: echo_next(query.next),
    })
    .into_response())
}

pub async fn login(
    Extension(state): Extension<AppState>,
    Query(query): Query<NextQuery>,
    jar: CookieJar,
    ValidatedForm(submission): ValidatedForm<LoginSubmission>,
) -> Result<Response, AppError> {
    let next = pick_next(submission.next, query.next);
    if state.sessions.current_user(&jar).await?.is_some() {
        return Ok(Redirect::to(&redirect_target(next.as_deref())).into_response());
    }

    let rerender = |errors: FieldErrors, non_field_errors: Vec<String>, next: Option<String>| {
        let page = LoginPage {
            username: submission.form.username.clone(),
            errors,
            non_field_errors,
            next: echo_next(next),
        };
        (StatusCode::BAD_REQUEST, Json(page)).into_response()
    };

    match state.identity.authenticate(&submission.form).await {
        Ok(user) => {
            let jar = state.sessions.start(jar, user.id).await?;
            Ok((jar, Redirect::to(&redirect_target(next.as_deref()))).into_response())
        }
        Err(AppError::Validation(errors)) => Ok(rerender(errors, Vec::new(), next)),
        Err(err @ AppError::InvalidCredentials) => {
            Ok(rerender(FieldErrors::new(), vec![err.to_string()], next))
        }
        Err(other) => Err(other),
    }
}

pub async fn register_form(Query(query): Query<NextQuery>) -> Response {
    Json(RegistrationPage {
        form: ProfileForm::default(),
        errors: FieldErrors::new(),
        next: echo_next(query.next),
    })
    .into_response()
}

/// Creates the account and logs the new user straight in.
pub async fn register(
    Extension(state): Extension<AppState>,
    Query(query): Query<NextQuery>,
    jar: CookieJar,
    ValidatedForm(submission): ValidatedForm<RegistrationSubmission>,
) -> Result<Response, AppError> {
    let next = pick_next(submission.next, query.next);

    match state.identity.register(&submission.form).await {
        Ok(user) => {
            let jar = state.sessions.start(jar, user.id).await?;
            Ok((jar, Redirect::to(&redirect_target(next.as_deref()))).into_response())
        }
        Err(AppError::Validation(errors)) => {
            let page = RegistrationPage {
                form: submission.form.echo(),
                errors,
                next: echo_next(next),
            };
            Ok((StatusCode::BAD_REQUEST, Json(page)).into_response())
        }
        Err(other) => Err(other),
    }
}

pub async fn logout(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let jar = state.sessions.end(jar).await?;
    crate::log_security_event!(
        SecurityEvent::Logout,
        user_id = %LoggableUuid(user_id),
        "User logged out"
    );

    Ok((jar, Redirect::to(LOGIN_PATH)).into_response())
}
