use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{NoteRepository, SessionStore, UserStore};
use crate::errors::AppError;
use crate::models::note::{NewNote, Note, NoteDraft};
use crate::models::session::Session;
use crate::models::user::{NewUser, ProfileDetails, User};

const USERNAME_CONSTRAINT: &str = "users_username_key";

#[derive(Clone, Default)]
pub struct InMemoryNoteRepository {
    notes: Arc<RwLock<HashMap<Uuid, Note>>>,
}

impl InMemoryNoteRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NoteRepository for InMemoryNoteRepository {
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Note>, AppError> {
        let notes = self.notes.read().await;
        let mut owned: Vec<Note> = notes
            .values()
            .filter(|note| note.user_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(owned)
    }

    async fn get(&self, note_id: Uuid, owner_id: Uuid) -> Result<Note, AppError> {
        let notes = self.notes.read().await;
        notes
            .get(&note_id)
            .filter(|note| note.user_id == owner_id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn create(&self, owner_id: Uuid, draft: NoteDraft) -> Result<Note, AppError> {
        let note = NewNote::new(owner_id, draft, Utc::now()).into_note();
        let mut notes = self.notes.write().await;
        notes.insert(note.id, note.clone());
        Ok(note)
    }

    async fn update(
        &self,
        note_id: Uuid,
        owner_id: Uuid,
        draft: NoteDraft,
    ) -> Result<Note, AppError> {
        let mut notes = self.notes.write().await;
        let note = notes
            .get_mut(&note_id)
            .filter(|note| note.user_id == owner_id)
            .ok_or(AppError::NotFound)?;

        note.title = draft.title;
        note.content = draft.content;
        note.updated_at = Utc::now().max(note.updated_at);
        Ok(note.clone())
    }

    async fn delete(&self, note_id: Uuid, owner_id: Uuid) -> Result<(), AppError> {
        let mut notes = self.notes.write().await;
        match notes.get(&note_id) {
            Some(note) if note.user_id == owner_id => {
                notes.remove(&note_id);
                Ok(())
            }
            _ => Err(AppError::NotFound),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn username_conflict() -> AppError {
    AppError::Conflict(format!("duplicate value violates {USERNAME_CONSTRAINT}"))
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.values().any(|existing| existing.username == user.username) {
            return Err(username_conflict());
        }

        let user = user.into_user();
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, user_id: Uuid) -> Result<User, AppError> {
        let users = self.users.read().await;
        users.get(&user_id).cloned().ok_or(AppError::NotFound)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn update_details(
        &self,
        user_id: Uuid,
        details: ProfileDetails,
    ) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|existing| existing.id != user_id && existing.username == details.username)
        {
            return Err(username_conflict());
        }

        let user = users.get_mut(&user_id).ok_or(AppError::NotFound)?;
        user.username = details.username;
        user.email = details.email;
        user.updated_at = Utc::now().max(user.updated_at);
        Ok(user.clone())
    }

    async fn set_password_hash(
        &self,
        user_id: Uuid,
        password_hash: String,
    ) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&user_id).ok_or(AppError::NotFound)?;
        user.password_hash = password_hash;
        user.updated_at = Utc::now().max(user.updated_at);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: Session) -> Result<(), AppError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, existing| !existing.is_expired(now));
        sessions.insert(session.id, session);
        Ok(())
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<Session>, AppError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(&session_id)
            .filter(|session| !session.is_expired(Utc::now()))
            .cloned())
    }

    async fn delete(&self, session_id: Uuid) -> Result<(), AppError> {
        self.sessions.write().await.remove(&session_id);
        Ok(())
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<usize, AppError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.user_id != user_id);
        Ok(before - sessions.len())
    }
}
