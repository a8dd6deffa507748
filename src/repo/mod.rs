//! Storage seams. Every note query takes the owner explicitly so a note that
//! belongs to someone else looks exactly like a missing one.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::note::{Note, NoteDraft};
use crate::models::session::Session;
use crate::models::user::{NewUser, ProfileDetails, User};

pub use memory::{InMemoryNoteRepository, InMemorySessionStore, InMemoryUserStore};
pub use postgres::{PgNoteRepository, PgSessionStore, PgUserStore};

#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Notes of `owner_id`, most recently updated first.
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Note>, AppError>;

    async fn get(&self, note_id: Uuid, owner_id: Uuid) -> Result<Note, AppError>;

    async fn create(&self, owner_id: Uuid, draft: NoteDraft) -> Result<Note, AppError>;

    async fn update(&self, note_id: Uuid, owner_id: Uuid, draft: NoteDraft)
    -> Result<Note, AppError>;

    async fn delete(&self, note_id: Uuid, owner_id: Uuid) -> Result<(), AppError>;
}

/// Account persistence. Username uniqueness violations come back as
/// [`AppError::Conflict`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<User, AppError>;

    async fn get(&self, user_id: Uuid) -> Result<User, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn update_details(
        &self,
        user_id: Uuid,
        details: ProfileDetails,
    ) -> Result<User, AppError>;

    async fn set_password_hash(&self, user_id: Uuid, password_hash: String)
    -> Result<(), AppError>;
}

/// Login records behind the session cookie. Expired records are purged as
/// new ones are inserted.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> Result<(), AppError>;

    /// The live record for `session_id`; expired records count as missing.
    async fn get(&self, session_id: Uuid) -> Result<Option<Session>, AppError>;

    /// Removing a record that is already gone is not an error.
    async fn delete(&self, session_id: Uuid) -> Result<(), AppError>;

    /// Ends every session of `user_id`, returning how many were removed.
    async fn delete_for_user(&self, user_id: Uuid) -> Result<usize, AppError>;
}
