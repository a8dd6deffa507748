use uuid::Uuid;

use super::{IdentityService, Notice};
use crate::errors::AppError;
use crate::logging::{LoggableUuid, SanitizedUsername, SecurityEvent};
use crate::models::user::{PasswordChangeForm, ProfileForm, User};

/// Account page operations on top of the identity store.
#[derive(Clone)]
pub struct ProfileService {
    identity: IdentityService,
}

impl ProfileService {
    pub fn new(identity: IdentityService) -> Self {
        Self { identity }
    }

    pub async fn view(&self, user_id: Uuid) -> Result<User, AppError> {
        self.identity.get(user_id).await
    }

    pub async fn update_profile(&self, user_id: Uuid, form: &ProfileForm) -> Result<User, AppError> {
        let user = self.identity.update_details(user_id, form).await?;

        crate::log_security_event!(
            SecurityEvent::ProfileUpdated,
            user_id = %LoggableUuid(user.id),
            username = %SanitizedUsername::new(&user.username),
            "Profile updated"
        );
        Ok(user)
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        form: &PasswordChangeForm,
    ) -> Result<Notice, AppError> {
        self.identity.change_password(user_id, form).await?;
        Ok(Notice::PasswordChanged)
    }
}
