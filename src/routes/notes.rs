use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::FieldErrors;
use crate::models::note::{Note, NoteForm};
use crate::security::auth::AuthenticatedUser;
use crate::security::flash;
use crate::security::form::ValidatedForm;
use crate::services::Notice;
use crate::state::AppState;

const NOTES_PATH: &str = "/notes/";

pub fn router() -> Router {
    Router::new()
        .route("/notes/", get(list_notes))
        .route("/notes/new/", get(new_note_form).post(create_note))
        .route("/notes/:id/", get(view_note))
        .route("/notes/:id/edit/", get(edit_note_form).post(update_note))
        .route("/notes/:id/delete/", post(delete_note))
}

fn detail_path(note_id: Uuid) -> String {
    format!("/notes/{note_id}/")
}

/// Ids that do not parse are answered exactly like ids owned by someone else.
fn parse_note_id(raw: &str) -> Result<Uuid, AppError> {
    raw.parse().map_err(|_| AppError::NotFound)
}

#[derive(Debug, Serialize)]
struct WallPage {
    notes: Vec<Note>,
    messages: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct NotePage {
    note: Note,
    messages: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct NoteFormPage {
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<Note>,
    form: NoteForm,
    errors: FieldErrors,
}

impl NoteFormPage {
    fn render(status: StatusCode, note: Option<Note>, form: NoteForm, errors: FieldErrors) -> Response {
        (status, Json(NoteFormPage { note, form, errors })).into_response()
    }
}

pub async fn list_notes(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let notes = state.notes.list(user_id).await?;
    let (jar, messages) = flash::take(jar);

    Ok((jar, Json(WallPage { notes, messages })))
}

pub async fn view_note(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(raw_id): Path<String>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let note = state.notes.get(parse_note_id(&raw_id)?, user_id).await?;
    let (jar, messages) = flash::take(jar);

    Ok((jar, Json(NotePage { note, messages })))
}

pub async fn new_note_form() -> Response {
    NoteFormPage::render(StatusCode::OK, None, NoteForm::default(), FieldErrors::new())
}

pub async fn create_note(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    jar: CookieJar,
    ValidatedForm(form): ValidatedForm<NoteForm>,
) -> Result<Response, AppError> {
    match state.notes.create(user_id, &form).await {
        Ok(_) => Ok((flash::push(jar, Notice::NoteCreated), Redirect::to(NOTES_PATH)).into_response()),
        Err(AppError::Validation(errors)) => Ok(NoteFormPage::render(
            StatusCode::BAD_REQUEST,
            None,
            form,
            errors,
        )),
        Err(other) => Err(other),
    }
}

pub async fn edit_note_form(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let note = state.notes.get(parse_note_id(&raw_id)?, user_id).await?;
    let form = NoteForm::from(&note);

    Ok(NoteFormPage::render(
        StatusCode::OK,
        Some(note),
        form,
        FieldErrors::new(),
    ))
}

pub async fn update_note(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(raw_id): Path<String>,
    jar: CookieJar,
    ValidatedForm(form): ValidatedForm<NoteForm>,
) -> Result<Response, AppError> {
    let note_id = parse_note_id(&raw_id)?;

    match state.notes.update(note_id, user_id, &form).await {
        Ok(note) => Ok((
            flash::push(jar, Notice::NoteUpdated),
            Redirect::to(&detail_path(note.id)),
        )
            .into_response()),
        Err(AppError::Validation(errors)) => {
            let note = state.notes.get(note_id, user_id).await?;
            Ok(NoteFormPage::render(
                StatusCode::BAD_REQUEST,
                Some(note),
                form,
                errors,
            ))
        }
        Err(other) => Err(other),
    }
}

pub async fn delete_note(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(raw_id): Path<String>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    state.notes.delete(parse_note_id(&raw_id)?, user_id).await?;

    Ok((flash::push(jar, Notice::NoteDeleted), Redirect::to(NOTES_PATH)).into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::routes::testing::{
        get, json_body, location, post_form, send, set_cookies, sign_up, test_app,
    };
    use crate::security::form::MAX_BODY_SIZE_BYTES;

    async fn create(app: &Router, session: &str, body: &str) -> String {
        let response = send(app, post_form("/notes/new/", body, &[session.to_string()])).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), NOTES_PATH);

        let wall = json_body(send(app, get("/notes/", &[session.to_string()])).await).await;
        wall["notes"][0]["id"]
            .as_str()
            .expect("created note is listed")
            .to_string()
    }

    #[tokio::test]
    async fn test_wall_requires_login() {
        let app = test_app();
        let response = send(&app, get("/notes/", &[])).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login/?next=%2Fnotes%2F");
    }

    #[tokio::test]
    async fn test_every_note_route_is_gated() {
        let app = test_app();
        let id = Uuid::new_v4();
        let requests = [
            get("/notes/new/", &[]),
            get(&format!("/notes/{id}/"), &[]),
            get(&format!("/notes/{id}/edit/"), &[]),
            post_form(&format!("/notes/{id}/delete/"), "", &[]),
            post_form("/notes/new/", "title=T&content=C", &[]),
        ];

        for request in requests {
            let path = request.uri().path().to_string();
            let response = send(&app, request).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
            assert!(location(&response).starts_with("/login/?next="), "{path}");
        }
    }

    #[tokio::test]
    async fn test_bob_creates_note_and_sees_it_once() {
        let app = test_app();
        let bob = sign_up(&app, "bob").await;
        let alice = sign_up(&app, "alice").await;

        let response = send(
            &app,
            post_form("/notes/new/", "title=T&content=C", &[bob.clone()]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let mut cookies = set_cookies(&response);
        cookies.push(bob.clone());

        let wall = json_body(send(&app, get("/notes/", &cookies)).await).await;
        let notes = wall["notes"].as_array().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0]["title"], "T");
        assert_eq!(notes[0]["content"], "C");
        assert_eq!(wall["messages"][0], "Note created.");

        let other = json_body(send(&app, get("/notes/", &[alice])).await).await;
        assert!(other["notes"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_with_empty_title_rerenders_form() {
        let app = test_app();
        let bob = sign_up(&app, "bob").await;

        let response = send(
            &app,
            post_form("/notes/new/", "title=&content=kept", &[bob.clone()]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let page = json_body(response).await;
        assert_eq!(page["errors"]["title"][0], "This field is required.");
        assert_eq!(page["form"]["content"], "kept");

        let wall = json_body(send(&app, get("/notes/", &[bob])).await).await;
        assert!(wall["notes"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_owner_can_view_edit_and_delete() {
        let app = test_app();
        let bob = sign_up(&app, "bob").await;
        let id = create(&app, &bob, "title=Hello&content=World").await;

        let page = json_body(send(&app, get(&format!("/notes/{id}/"), &[bob.clone()])).await).await;
        assert_eq!(page["note"]["title"], "Hello");

        let form = json_body(
            send(&app, get(&format!("/notes/{id}/edit/"), &[bob.clone()])).await,
        )
        .await;
        assert_eq!(form["form"]["title"], "Hello");

        let response = send(
            &app,
            post_form(
                &format!("/notes/{id}/edit/"),
                "title=New&content=Body2",
                &[bob.clone()],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), format!("/notes/{id}/"));

        let page = json_body(send(&app, get(&format!("/notes/{id}/"), &[bob.clone()])).await).await;
        assert_eq!(page["note"]["title"], "New");
        assert_eq!(page["note"]["content"], "Body2");

        let response = send(
            &app,
            post_form(&format!("/notes/{id}/delete/"), "", &[bob.clone()]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), NOTES_PATH);

        let response = send(&app, get(&format!("/notes/{id}/"), &[bob.clone()])).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(
            &app,
            post_form(&format!("/notes/{id}/delete/"), "", &[bob]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_non_owner_gets_not_found_everywhere() {
        let app = test_app();
        let owner = sign_up(&app, "owner").await;
        let eve = sign_up(&app, "eve").await;
        let id = create(&app, &owner, "title=Private&content=Top+secret").await;

        let attempts = [
            get(&format!("/notes/{id}/"), &[eve.clone()]),
            get(&format!("/notes/{id}/edit/"), &[eve.clone()]),
            post_form(
                &format!("/notes/{id}/edit/"),
                "title=Mine&content=now",
                &[eve.clone()],
            ),
            post_form(&format!("/notes/{id}/edit/"), "title=&content=", &[eve.clone()]),
            post_form(&format!("/notes/{id}/delete/"), "", &[eve.clone()]),
        ];
        for request in attempts {
            let path = request.uri().path().to_string();
            let response = send(&app, request).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        }

        let missing = send(&app, get(&format!("/notes/{}/", Uuid::new_v4()), &[eve.clone()])).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let malformed = send(&app, get("/notes/42/", &[eve])).await;
        assert_eq!(malformed.status(), StatusCode::NOT_FOUND);

        let page = json_body(send(&app, get(&format!("/notes/{id}/"), &[owner])).await).await;
        assert_eq!(page["note"]["title"], "Private");
        assert_eq!(page["note"]["content"], "Top secret");
    }

    #[tokio::test]
    async fn test_json_body_is_rejected() {
        let app = test_app();
        let bob = sign_up(&app, "bob").await;

        let request = axum::http::Request::post("/notes/new/")
            .header("content-type", "application/json")
            .header("cookie", bob)
            .body(axum::body::Body::from(r#"{"title":"T","content":"C"}"#))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_long_content_is_accepted_whole() {
        let app = test_app();
        let bob = sign_up(&app, "bob").await;
        let content = "x".repeat(70_000);

        let id = create(&app, &bob, &format!("title=Essay&content={content}")).await;

        let page = json_body(send(&app, get(&format!("/notes/{id}/"), &[bob])).await).await;
        assert_eq!(page["note"]["content"].as_str().map(str::len), Some(70_000));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let app = test_app();
        let bob = sign_up(&app, "bob").await;
        let content = "x".repeat(MAX_BODY_SIZE_BYTES);

        let response = send(
            &app,
            post_form("/notes/new/", &format!("title=T&content={content}"), &[bob]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
