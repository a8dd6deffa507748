use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::users;

use super::{FieldErrors, ModelValidationError, ValidationResult, required};

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewUser {
    pub fn new(details: ProfileDetails, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: details.username,
            email: details.email,
            password_hash,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Validated username and email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDetails {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

impl ProfileForm {
    pub fn validate(&self) -> Result<ProfileDetails, FieldErrors> {
        let mut errors = FieldErrors::new();
        let username = errors.check("username", normalize_username(&self.username));
        let email = errors.check("email", normalize_email(&self.email));

        match (username, email) {
            (Some(username), Some(email)) => Ok(ProfileDetails { username, email }),
            _ => Err(errors),
        }
    }
}

impl From<&User> for ProfileForm {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

impl RegistrationForm {
    pub fn validate(&self) -> Result<ProfileDetails, FieldErrors> {
        let mut errors = FieldErrors::new();
        let username = errors.check("username", normalize_username(&self.username));
        let email = errors.check("email", normalize_email(&self.email));
        errors.check(
            "password2",
            ensure_new_password(&self.password1, &self.password2),
        );

        match (username, email) {
            (Some(username), Some(email)) if errors.is_empty() => {
                Ok(ProfileDetails { username, email })
            }
            _ => Err(errors),
        }
    }

    /// The submitted values that are safe to echo back into the form.
    pub fn echo(&self) -> ProfileForm {
        ProfileForm {
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(String, &str), FieldErrors> {
        let mut errors = FieldErrors::new();
        let username = errors.check("username", required(&self.username));
        if self.password.is_empty() {
            errors.add("password", ModelValidationError::Required);
        }

        match username {
            Some(username) if errors.is_empty() => Ok((username, self.password.as_str())),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PasswordChangeForm {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password1: String,
    #[serde(default)]
    pub new_password2: String,
}

impl PasswordChangeForm {
    /// Checks the shape of the submission; the old password is verified by the identity store.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.old_password.is_empty() {
            errors.add("old_password", ModelValidationError::Required);
        }
        errors.check(
            "new_password2",
            ensure_new_password(&self.new_password1, &self.new_password2),
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn normalize_username(value: &str) -> ValidationResult<String> {
    let username = required(value)?;
    ensure_valid_username(&username)?;
    Ok(username)
}

/// Email is optional; an empty value is kept as-is. Only the domain is
/// lowercased, the local part is kept as typed.
fn normalize_email(value: &str) -> ValidationResult<String> {
    let email = match value.trim().rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => value.trim().to_string(),
    };
    if !email.is_empty() {
        ensure_valid_email(&email)?;
    }
    Ok(email)
}

fn ensure_new_password(password1: &str, password2: &str) -> ValidationResult<()> {
    if password1.is_empty() || password2.is_empty() {
        return Err(ModelValidationError::Required);
    }
    if password1 != password2 {
        return Err(ModelValidationError::PasswordMismatch);
    }
    ensure_valid_password(password1)
}

pub(crate) fn ensure_valid_username(value: &str) -> ValidationResult<()> {
    let len = value.chars().count();
    let is_ascii = value.is_ascii();
    if !(3..=32).contains(&len) || !is_ascii {
        tracing::debug!(
            length = len,
            is_ascii = is_ascii,
            "Username validation failed: invalid length or non-ASCII characters"
        );
        return Err(ModelValidationError::InvalidUsername);
    }

    let allowed = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !allowed {
        tracing::debug!("Username validation failed: contains invalid characters");
        return Err(ModelValidationError::InvalidUsername);
    }
    Ok(())
}

pub(crate) fn ensure_valid_email(value: &str) -> ValidationResult<()> {
    let len = value.len();
    if !(3..=255).contains(&len) {
        tracing::debug!(length = len, "Email validation failed: invalid length");
        return Err(ModelValidationError::InvalidEmail);
    }

    let Some((local, domain)) = value.split_once('@') else {
        tracing::debug!("Email validation failed: missing @");
        return Err(ModelValidationError::InvalidEmail);
    };
    if domain.contains('@') {
        tracing::debug!("Email validation failed: multiple @ symbols");
        return Err(ModelValidationError::InvalidEmail);
    }

    if local.is_empty() || domain.len() < 3 || !domain.contains('.') {
        tracing::debug!(
            local_empty = local.is_empty(),
            domain_length = domain.len(),
            has_dot = domain.contains('.'),
            "Email validation failed: invalid local or domain part"
        );
        return Err(ModelValidationError::InvalidEmail);
    }

    if !local.chars().chain(domain.chars()).all(|c| c.is_ascii_graphic()) {
        tracing::debug!("Email validation failed: contains invalid characters");
        return Err(ModelValidationError::InvalidEmail);
    }

    Ok(())
}

pub(crate) fn ensure_valid_password(password: &str) -> ValidationResult<()> {
    if password.chars().count() < 12 {
        tracing::debug!("Password validation failed: too short (minimum 12 characters)");
        return Err(ModelValidationError::WeakPassword);
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_ascii_alphanumeric());

    if has_upper && has_lower && has_digit && has_symbol {
        Ok(())
    } else {
        tracing::debug!(
            has_uppercase = has_upper,
            has_lowercase = has_lower,
            has_digit = has_digit,
            has_symbol = has_symbol,
            "Password validation failed: missing required character types"
        );
        Err(ModelValidationError::WeakPassword)
    }
}
