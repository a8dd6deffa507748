pub mod note;
pub mod session;
pub mod user;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelValidationError {
    #[error("This field is required.")]
    Required,
    #[error("Ensure this value has at most {max} characters (it has {length}).")]
    TooLong { max: usize, length: usize },
    #[error("Enter a valid username: 3-32 letters, digits, underscores or hyphens.")]
    InvalidUsername,
    #[error("Enter a valid email address.")]
    InvalidEmail,
    #[error(
        "Password must be at least 12 characters and include upper, lower, digit, and symbol characters."
    )]
    WeakPassword,
    #[error("The two password fields didn't match.")]
    PasswordMismatch,
    #[error("Your old password was entered incorrectly.")]
    IncorrectPassword,
    #[error("A user with that username already exists.")]
    UsernameTaken,
}

pub type ValidationResult<T> = Result<T, ModelValidationError>;

/// Field-level validation messages, keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, error: ModelValidationError) -> Self {
        let mut errors = Self::new();
        errors.add(field, error);
        errors
    }

    pub fn add(&mut self, field: &'static str, error: ModelValidationError) {
        self.0.entry(field).or_default().push(error.to_string());
    }

    /// Records the error of `result` under `field` and hands back the value on success.
    pub fn check<T>(&mut self, field: &'static str, result: ValidationResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.add(field, err);
                None
            }
        }
    }

    #[cfg(test)]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    #[cfg(test)]
    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Trims `value` and rejects it when nothing is left.
pub(crate) fn required(value: &str) -> ValidationResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ModelValidationError::Required)
    } else {
        Ok(trimmed.to_string())
    }
}

pub(crate) fn max_chars(value: String, max: usize) -> ValidationResult<String> {
    let length = value.chars().count();
    if length > max {
        Err(ModelValidationError::TooLong { max, length })
    } else {
        Ok(value)
    }
}
