use axum::{
    Extension, Json, Router,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::FieldErrors;
use crate::models::user::{PasswordChangeForm, ProfileForm, User};
use crate::security::auth::AuthenticatedUser;
use crate::security::flash;
use crate::security::form::ValidatedForm;
use crate::services::Notice;
use crate::state::AppState;

const ACCOUNT_PATH: &str = "/account/";

pub fn router() -> Router {
    Router::new()
        .route("/account/", get(view_profile))
        .route("/account/edit/", get(edit_profile_form).post(update_profile))
        .route(
            "/password/change/",
            get(change_password_form).post(change_password),
        )
}

#[derive(Debug, Serialize)]
struct ProfilePage {
    user: User,
    messages: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct ProfileFormPage {
    form: ProfileForm,
    errors: FieldErrors,
}

/// Password fields are never echoed back.
#[derive(Debug, Serialize)]
struct PasswordChangePage {
    errors: FieldErrors,
}

pub async fn view_profile(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let user = state.profiles.view(user_id).await?;
    let (jar, messages) = flash::take(jar);

    Ok((jar, Json(ProfilePage { user, messages })))
}

pub async fn edit_profile_form(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<ProfileFormPage>, AppError> {
    let user = state.profiles.view(user_id).await?;

    Ok(Json(ProfileFormPage {
        form: ProfileForm::from(&user),
        errors: FieldErrors::new(),
    }))
}

pub async fn update_profile(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    jar: CookieJar,
    ValidatedForm(form): ValidatedForm<ProfileForm>,
) -> Result<Response, AppError> {
    match state.profiles.update_profile(user_id, &form).await {
        Ok(_) => Ok((
            flash::push(jar, Notice::ProfileUpdated),
            Redirect::to(ACCOUNT_PATH),
        )
            .into_response()),
        Err(AppError::Validation(errors)) => Ok((
            StatusCode::BAD_REQUEST,
            Json(ProfileFormPage { form, errors }),
        )
            .into_response()),
        Err(other) => Err(other),
    }
}

pub async fn change_password_form() -> Json<PasswordChangePage> {
    Json(PasswordChangePage {
        errors: FieldErrors::new(),
    })
}

pub async fn change_password(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    jar: CookieJar,
    ValidatedForm(form): ValidatedForm<PasswordChangeForm>,
) -> Result<Response, AppError> {
    match state.profiles.change_password(user_id, &form).await {
        Ok(notice) => {
            // Every other login of this user ends here; the caller continues on a new session.
            let jar = state.sessions.rotate(jar, user_id).await?;
            Ok((flash::push(jar, notice), Redirect::to(ACCOUNT_PATH)).into_response())
        }
        Err(AppError::Validation(errors)) => Ok((
            StatusCode::BAD_REQUEST,
            Json(PasswordChangePage { errors }),
        )
            .into_response()),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::routes::testing::{
        get, json_body, location, post_form, send, session_cookie, set_cookies, sign_up,
        test_app,
    };
    use crate::services::identity::tests::PASSWORD;

    const NEW_PASSWORD: &str = "Battery-Staple-42";

    #[tokio::test]
    async fn test_account_pages_require_login() {
        let app = test_app();
        for uri in ["/account/", "/account/edit/", "/password/change/"] {
            let response = send(&app, get(uri, &[])).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
        }

        let response = send(&app, post_form("/account/edit/", "username=x", &[])).await;
        assert_eq!(location(&response), "/login/?next=%2Faccount%2Fedit%2F");
    }

    #[tokio::test]
    async fn test_profile_shows_current_user() {
        let app = test_app();
        let dave = sign_up(&app, "dave").await;

        let page = json_body(send(&app, get("/account/", &[dave])).await).await;
        assert_eq!(page["user"]["username"], "dave");
        assert_eq!(page["user"]["email"], "");
        assert_eq!(page["messages"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_update_profile_flashes_notice() {
        let app = test_app();
        let dave = sign_up(&app, "dave").await;

        let form = json_body(send(&app, get("/account/edit/", &[dave.clone()])).await).await;
        assert_eq!(form["form"]["username"], "dave");

        let response = send(
            &app,
            post_form(
                "/account/edit/",
                "username=david&email=David%40Example.com",
                &[dave.clone()],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), ACCOUNT_PATH);

        let mut cookies = set_cookies(&response);
        cookies.push(dave);
        let page = json_body(send(&app, get("/account/", &cookies)).await).await;
        assert_eq!(page["user"]["username"], "david");
        assert_eq!(page["user"]["email"], "David@example.com");
        assert_eq!(page["messages"][0], "Your profile was updated successfully.");
    }

    #[tokio::test]
    async fn test_update_profile_rejects_taken_username() {
        let app = test_app();
        sign_up(&app, "erin").await;
        let dave = sign_up(&app, "dave").await;

        let response = send(&app, post_form("/account/edit/", "username=erin", &[dave])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let page = json_body(response).await;
        assert_eq!(
            page["errors"]["username"][0],
            "A user with that username already exists."
        );
        assert_eq!(page["form"]["username"], "erin");
    }

    #[tokio::test]
    async fn test_change_password_then_log_in_with_it() {
        let app = test_app();
        let dave = sign_up(&app, "dave").await;

        let body = format!(
            "old_password={PASSWORD}&new_password1={NEW_PASSWORD}&new_password2={NEW_PASSWORD}"
        );
        let response = send(&app, post_form("/password/change/", &body, &[dave])).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), ACCOUNT_PATH);

        let cookies = set_cookies(&response);
        assert!(session_cookie(&response).is_some(), "caller gets a fresh session");
        let page = json_body(send(&app, get("/account/", &cookies)).await).await;
        assert_eq!(page["messages"][0], "Your password was updated successfully.");

        let old = format!("username=dave&password={PASSWORD}");
        let response = send(&app, post_form("/login/", &old, &[])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let new = format!("username=dave&password={NEW_PASSWORD}");
        let response = send(&app, post_form("/login/", &new, &[])).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(session_cookie(&response).is_some());
    }

    #[tokio::test]
    async fn test_change_password_ends_other_sessions() {
        let app = test_app();
        let laptop = sign_up(&app, "dave").await;
        let login = format!("username=dave&password={PASSWORD}");
        let phone = session_cookie(&send(&app, post_form("/login/", &login, &[])).await)
            .expect("second session");

        let body = format!(
            "old_password={PASSWORD}&new_password1={NEW_PASSWORD}&new_password2={NEW_PASSWORD}"
        );
        let response = send(&app, post_form("/password/change/", &body, &[laptop.clone()])).await;
        let fresh = session_cookie(&response).expect("fresh session");

        for stale in [phone, laptop] {
            let response = send(&app, get("/notes/", &[stale])).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), "/login/?next=%2Fnotes%2F");
        }
        let response = send(&app, get("/notes/", &[fresh])).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_change_password_wrong_old_password() {
        let app = test_app();
        let dave = sign_up(&app, "dave").await;

        let body = format!(
            "old_password=not-it&new_password1={NEW_PASSWORD}&new_password2={NEW_PASSWORD}"
        );
        let response = send(&app, post_form("/password/change/", &body, &[dave])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let page = json_body(response).await;
        assert_eq!(
            page["errors"]["old_password"][0],
            "Your old password was entered incorrectly."
        );
        assert!(page.get("new_password1").is_none());
    }

    #[tokio::test]
    async fn test_change_password_mismatch() {
        let app = test_app();
        let dave = sign_up(&app, "dave").await;

        let body = format!(
            "old_password={PASSWORD}&new_password1={NEW_PASSWORD}&new_password2=Other-Thing-77"
        );
        let response = send(&app, post_form("/password/change/", &body, &[dave])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let page = json_body(response).await;
        assert_eq!(
            page["errors"]["new_password2"][0],
            "The two password fields didn't match."
        );
    }
}
