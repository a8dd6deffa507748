use std::error::Error as StdError;
use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use thiserror::Error;

use crate::logging::SecurityEvent;
use crate::models::FieldErrors;

/// Centralized application error type shared by the stores, the services
/// and the HTTP layer.
#[derive(Debug, Error)]
pub enum AppError {
    // Validation errors
    #[error("validation error: {0}")]
    Validation(FieldErrors),

    #[error("invalid form payload: {0}")]
    InvalidForm(String),

    // Authentication errors
    #[error("Please enter a correct username and password.")]
    InvalidCredentials,

    #[error("authenticated identity not found in request context")]
    MissingIdentity,

    // Resource errors
    #[error("resource not found")]
    NotFound,

    #[error("resource conflict: {0}")]
    Conflict(String),

    // Storage errors
    #[error("database error")]
    Database(#[source] DieselError),

    #[error("connection pool error: {0}")]
    Pool(String),

    // Security errors
    #[error("failed to encode session token: {0}")]
    TokenEncoding(String),

    #[error("failed to hash password: {0}")]
    PasswordHashing(String),

    #[error("internal error: {0}")]
    Internal(String),

    // Rate limiting
    #[error("rate limit exceeded; please try again later")]
    RateLimitExceeded { retry_after: Option<Duration> },

    // Request parsing errors
    #[error("unsupported media type: expected application/x-www-form-urlencoded")]
    UnsupportedMediaType,

    #[error("request body too large")]
    PayloadTooLarge,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<FieldErrors>,
}

impl AppError {
    /// Maps a Diesel error to an appropriate AppError variant
    pub fn from_diesel(error: DieselError) -> Self {
        match error {
            DieselError::NotFound => AppError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                let constraint = info
                    .constraint_name()
                    .unwrap_or("unique constraint")
                    .to_string();
                AppError::Conflict(format!("duplicate value violates {}", constraint))
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                AppError::Conflict("foreign key constraint violation".to_string())
            }
            other => AppError::Database(other),
        }
    }

    pub(crate) fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client errors
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidForm(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 5xx Server errors
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::MissingIdentity => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::TokenEncoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::PasswordHashing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// In release builds only client errors carry their details.
    fn should_expose_details(&self) -> bool {
        cfg!(debug_assertions) || self.status_code().is_client_error()
    }

    fn user_message(&self) -> String {
        if self.should_expose_details() {
            return self.to_string();
        }

        match self {
            AppError::Database(_) => "a database error occurred".to_string(),
            AppError::Pool(_) => "service temporarily unavailable".to_string(),
            AppError::MissingIdentity | AppError::TokenEncoding(_) => {
                "authentication error".to_string()
            }
            AppError::PasswordHashing(_) => "password processing error".to_string(),
            _ => "internal server error".to_string(),
        }
    }

    fn error_details(&self) -> Option<String> {
        if !self.should_expose_details() {
            return None;
        }

        match self {
            AppError::Database(err) => Some(format!("database: {}", err)),
            AppError::Pool(err) => Some(format!("connection pool: {}", err)),
            _ => None,
        }
    }

    fn log_error(&self) {
        match self.status_code() {
            code if code.is_client_error() => match self {
                AppError::NotFound => {
                    // Owner mismatches are reported here as well.
                    tracing::debug!(status_code = %code, "Resource not found");
                }
                AppError::RateLimitExceeded { .. } => {
                    crate::log_security_event!(
                        SecurityEvent::RateLimitExceeded,
                        status_code = %code,
                        "Request rejected by rate limiter"
                    );
                }
                _ => {
                    tracing::warn!(error = %self, status_code = %code, "Client error");
                }
            },
            code if code.is_server_error() => {
                tracing::error!(
                    error = %self,
                    status_code = %code,
                    source = ?self.source(),
                    "Server error"
                );
            }
            _ => {}
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log_error();

        let status = self.status_code();
        let retry_after = match &self {
            AppError::RateLimitExceeded { retry_after } => *retry_after,
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: self.user_message(),
            details: self.error_details(),
            fields: match self {
                AppError::Validation(fields) => Some(fields),
                _ => None,
            },
        });

        let mut response = (status, body).into_response();
        if let Some(retry_after) = retry_after {
            response.headers_mut().insert(
                RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
        }
        response
    }
}

impl From<DieselError> for AppError {
    fn from(error: DieselError) -> Self {
        AppError::from_diesel(error)
    }
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        AppError::TokenEncoding(error.to_string())
    }
}

impl From<argon2::password_hash::Error> for AppError {
    fn from(error: argon2::password_hash::Error) -> Self {
        AppError::PasswordHashing(error.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(error: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("blocking task failed: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelValidationError;

    #[test]
    fn test_validation_error_status() {
        let error = AppError::Validation(FieldErrors::single(
            "title",
            ModelValidationError::Required,
        ));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_error_status() {
        assert_eq!(AppError::NotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = AppError::RateLimitExceeded {
            retry_after: Some(Duration::from_secs(42)),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "42");
    }

    #[test]
    fn test_diesel_not_found_maps_to_not_found() {
        let error = AppError::from_diesel(DieselError::NotFound);
        assert!(matches!(error, AppError::NotFound));
    }

    #[test]
    fn test_client_errors_are_exposed() {
        let error = AppError::InvalidForm("missing field".to_string());
        assert!(error.should_expose_details());
        assert!(error.user_message().contains("missing field"));
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_internal_errors_hidden_in_production() {
        let error = AppError::Internal("sensitive internal detail".to_string());
        assert!(!error.should_expose_details());
        assert!(!error.user_message().contains("sensitive internal detail"));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_internal_errors_exposed_in_debug() {
        let error = AppError::Database(DieselError::NotFound);
        assert!(error.should_expose_details());
    }
}
