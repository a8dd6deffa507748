use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
};
use serde::de::DeserializeOwned;

use crate::errors::AppError;

/// Whole-request bound (2.5 MiB). Note content has no length limit of its own.
pub const MAX_BODY_SIZE_BYTES: usize = 5 * 512 * 1024;

/// `application/x-www-form-urlencoded` body, deserialized with the path of
/// the offending field reported on failure.
#[derive(Debug)]
pub struct ValidatedForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        validate_content_type(req.headers())?;

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| match rejection.status() {
                StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge,
                _ => AppError::InvalidForm(rejection.body_text()),
            })?;

        parse_form(&body).map(ValidatedForm)
    }
}

pub(crate) fn parse_form<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    let deserializer = serde_urlencoded::Deserializer::new(form_urlencoded::parse(body));
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let error = err.into_inner();
        if path.is_empty() || path == "." {
            AppError::InvalidForm(error.to_string())
        } else {
            AppError::InvalidForm(format!("field `{path}`: {error}"))
        }
    })
}

fn validate_content_type(headers: &HeaderMap) -> Result<(), AppError> {
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if is_form {
        Ok(())
    } else {
        Err(AppError::UnsupportedMediaType)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::models::note::NoteForm;

    #[test]
    fn test_parse_form_decodes_fields() {
        let form: NoteForm = parse_form(b"title=Grocery+list&content=Milk%20%26%20eggs").unwrap();
        assert_eq!(form.title, "Grocery list");
        assert_eq!(form.content, "Milk & eggs");
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let form: NoteForm = parse_form(b"title=Only").unwrap();
        assert_eq!(form.content, "");
    }

    #[test]
    fn test_parse_error_names_field() {
        #[derive(Debug, Deserialize)]
        struct Paging {
            #[allow(dead_code)]
            page: u32,
        }

        let err = parse_form::<Paging>(b"page=abc").unwrap_err();
        assert!(err.to_string().contains("page"));
    }

    #[test]
    fn test_content_type_must_be_form() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            validate_content_type(&headers),
            Err(AppError::UnsupportedMediaType)
        ));

        headers.insert(
            CONTENT_TYPE,
            "application/x-www-form-urlencoded; charset=utf-8".parse().unwrap(),
        );
        assert!(validate_content_type(&headers).is_ok());
    }
}
