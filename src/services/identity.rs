use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use chrono::Utc;
use rand_core::OsRng;
use uuid::Uuid;

use crate::errors::AppError;
use crate::logging::{LoggableUuid, SanitizedEmail, SanitizedUsername, SecurityEvent};
use crate::models::user::{
    LoginForm, NewUser, PasswordChangeForm, ProfileForm, RegistrationForm, User,
};
use crate::models::{FieldErrors, ModelValidationError};
use crate::repo::UserStore;

/// Accounts and credentials. Password hashing and verification run on the
/// blocking pool.
#[derive(Clone)]
pub struct IdentityService {
    users: Arc<dyn UserStore>,
    hasher: Argon2<'static>,
}

impl IdentityService {
    pub fn new(users: Arc<dyn UserStore>, hasher: Argon2<'static>) -> Self {
        Self { users, hasher }
    }

    #[tracing::instrument(name = "register_user", skip(self, form), fields(username, user_id))]
    pub async fn register(&self, form: &RegistrationForm) -> Result<User, AppError> {
        let details = form.validate()?;
        let username = details.username.clone();
        let email = details.email.clone();

        tracing::Span::current().record(
            "username",
            tracing::field::display(SanitizedUsername::new(&username)),
        );

        if self.users.find_by_username(&username).await?.is_some() {
            crate::log_security_event!(
                SecurityEvent::RegistrationFailure,
                username = %SanitizedUsername::new(&username),
                reason = "username_taken",
                "User registration failed"
            );
            return Err(username_taken());
        }

        let password_hash = self.hash_password(form.password1.clone()).await?;
        let user = self
            .users
            .insert(NewUser::new(details, password_hash, Utc::now()))
            .await
            .map_err(|err| {
                crate::log_security_event!(
                    SecurityEvent::RegistrationFailure,
                    username = %SanitizedUsername::new(&username),
                    error = %err,
                    "User registration failed"
                );
                conflict_to_field_error(err)
            })?;

        tracing::Span::current().record("user_id", tracing::field::display(LoggableUuid(user.id)));
        crate::log_security_event!(
            SecurityEvent::RegistrationSuccess,
            user_id = %LoggableUuid(user.id),
            username = %SanitizedUsername::new(&username),
            email = %SanitizedEmail::new(&email),
            "User registered successfully"
        );

        Ok(user)
    }

    /// Unknown usernames and wrong passwords produce the same error.
    #[tracing::instrument(name = "login_user", skip(self, form), fields(username, user_id))]
    pub async fn authenticate(&self, form: &LoginForm) -> Result<User, AppError> {
        let (username, password) = form.validate()?;

        tracing::Span::current().record(
            "username",
            tracing::field::display(SanitizedUsername::new(&username)),
        );

        let Some(user) = self.users.find_by_username(&username).await? else {
            crate::log_security_event!(
                SecurityEvent::LoginFailure,
                username = %SanitizedUsername::new(&username),
                reason = "user_not_found",
                "Login failed: user not found"
            );
            return Err(AppError::InvalidCredentials);
        };

        tracing::Span::current().record("user_id", tracing::field::display(LoggableUuid(user.id)));

        if !self.verify_password(&user, password).await? {
            crate::log_security_event!(
                SecurityEvent::LoginFailure,
                user_id = %LoggableUuid(user.id),
                reason = "incorrect_password",
                "Login failed: incorrect password"
            );
            return Err(AppError::InvalidCredentials);
        }

        crate::log_security_event!(
            SecurityEvent::LoginSuccess,
            user_id = %LoggableUuid(user.id),
            username = %SanitizedUsername::new(&username),
            "User logged in successfully"
        );

        Ok(user)
    }

    pub async fn get(&self, user_id: Uuid) -> Result<User, AppError> {
        self.users.get(user_id).await
    }

    #[tracing::instrument(name = "change_password", skip(self, form), fields(user_id = %LoggableUuid(user_id)))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        form: &PasswordChangeForm,
    ) -> Result<(), AppError> {
        let mut errors = form.validate().err().unwrap_or_default();
        let user = self.users.get(user_id).await?;

        if !form.old_password.is_empty() && !self.verify_password(&user, &form.old_password).await? {
            crate::log_security_event!(
                SecurityEvent::PasswordChangeFailure,
                user_id = %LoggableUuid(user_id),
                reason = "incorrect_old_password",
                "Password change rejected"
            );
            errors.add("old_password", ModelValidationError::IncorrectPassword);
        }
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let password_hash = self.hash_password(form.new_password1.clone()).await?;
        self.users.set_password_hash(user_id, password_hash).await?;

        crate::log_security_event!(
            SecurityEvent::PasswordChanged,
            user_id = %LoggableUuid(user_id),
            "Password changed"
        );
        Ok(())
    }

    #[tracing::instrument(name = "update_user_details", skip(self, form), fields(user_id = %LoggableUuid(user_id)))]
    pub async fn update_details(&self, user_id: Uuid, form: &ProfileForm) -> Result<User, AppError> {
        let details = form.validate()?;
        self.users
            .update_details(user_id, details)
            .await
            .map_err(conflict_to_field_error)
    }

    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || -> Result<String, AppError> {
            let salt = SaltString::generate(&mut OsRng);
            let hash = hasher.hash_password(password.as_bytes(), &salt)?;
            Ok(hash.to_string())
        })
        .await?
    }

    async fn verify_password(&self, user: &User, password: &str) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        let stored = user.password_hash.clone();
        let password = password.to_string();
        let user_id = user.id;

        tokio::task::spawn_blocking(move || {
            let Ok(parsed) = PasswordHash::new(&stored) else {
                tracing::error!(user_id = %LoggableUuid(user_id), "Stored password hash is malformed");
                return false;
            };
            hasher.verify_password(password.as_bytes(), &parsed).is_ok()
        })
        .await
        .map_err(AppError::from)
    }
}

fn username_taken() -> AppError {
    FieldErrors::single("username", ModelValidationError::UsernameTaken).into()
}

fn conflict_to_field_error(err: AppError) -> AppError {
    match err {
        AppError::Conflict(_) => username_taken(),
        other => other,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use argon2::{Algorithm, Params, Version};

    use super::*;
    use crate::repo::InMemoryUserStore;

    pub(crate) const PASSWORD: &str = "Correct-Horse-9";

    /// Minimal argon2 cost so the suites stay fast.
    pub(crate) fn fast_hasher() -> Argon2<'static> {
        let params = Params::new(8, 1, 1, None).expect("valid argon2 params");
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    pub(crate) fn registration(username: &str) -> RegistrationForm {
        RegistrationForm {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password1: PASSWORD.to_string(),
            password2: PASSWORD.to_string(),
        }
    }

    fn service() -> IdentityService {
        IdentityService::new(Arc::new(InMemoryUserStore::new()), fast_hasher())
    }

    fn login(username: &str, password: &str) -> LoginForm {
        LoginForm {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let identity = service();
        let user = identity.register(&registration("alice")).await.unwrap();

        assert_eq!(user.username, "alice");
        assert_ne!(user.password_hash, PASSWORD);
        assert!(user.password_hash.starts_with("$argon2id$"));

        let authed = identity.authenticate(&login("alice", PASSWORD)).await.unwrap();
        assert_eq!(authed.id, user.id);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_alike() {
        let identity = service();
        identity.register(&registration("alice")).await.unwrap();

        assert!(matches!(
            identity.authenticate(&login("alice", "Wrong-Horse-99")).await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            identity.authenticate(&login("mallory", PASSWORD)).await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_username_is_field_error() {
        let identity = service();
        identity.register(&registration("alice")).await.unwrap();

        match identity.register(&registration("alice")).await {
            Err(AppError::Validation(fields)) => {
                assert_eq!(
                    fields.messages("username"),
                    ["A user with that username already exists."]
                );
            }
            other => panic!("expected username error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_change_password_requires_old_password() {
        let identity = service();
        let user = identity.register(&registration("alice")).await.unwrap();
        let new_password = "Battery-Staple-7";

        let wrong_old = PasswordChangeForm {
            old_password: "Not-The-Password-1".to_string(),
            new_password1: new_password.to_string(),
            new_password2: new_password.to_string(),
        };
        assert!(matches!(
            identity.change_password(user.id, &wrong_old).await,
            Err(AppError::Validation(ref f)) if f.contains("old_password")
        ));

        let form = PasswordChangeForm {
            old_password: PASSWORD.to_string(),
            ..wrong_old
        };
        identity.change_password(user.id, &form).await.unwrap();

        assert!(identity.authenticate(&login("alice", PASSWORD)).await.is_err());
        assert!(identity.authenticate(&login("alice", new_password)).await.is_ok());
    }

    #[tokio::test]
    async fn test_change_password_reports_every_failing_field() {
        let identity = service();
        let user = identity.register(&registration("alice")).await.unwrap();

        let form = PasswordChangeForm {
            old_password: "Not-The-Password-1".to_string(),
            new_password1: "Battery-Staple-7".to_string(),
            new_password2: "Battery-Staple-8".to_string(),
        };
        match identity.change_password(user.id, &form).await {
            Err(AppError::Validation(fields)) => {
                assert_eq!(
                    fields.messages("old_password"),
                    ["Your old password was entered incorrectly."]
                );
                assert_eq!(
                    fields.messages("new_password2"),
                    ["The two password fields didn't match."]
                );
            }
            other => panic!("expected field errors, got {other:?}"),
        }
        assert!(identity.authenticate(&login("alice", PASSWORD)).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_details_reports_taken_username() {
        let identity = service();
        identity.register(&registration("alice")).await.unwrap();
        let bob = identity.register(&registration("bob")).await.unwrap();

        let form = ProfileForm {
            username: "alice".to_string(),
            email: "bob@example.com".to_string(),
        };
        assert!(matches!(
            identity.update_details(bob.id, &form).await,
            Err(AppError::Validation(ref f)) if f.contains("username")
        ));
    }
}
