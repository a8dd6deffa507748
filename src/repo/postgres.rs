use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::{NoteRepository, SessionStore, UserStore};
use crate::db::{PgPool, connection};
use crate::errors::AppError;
use crate::models::note::{NewNote, Note, NoteDraft};
use crate::models::session::Session;
use crate::models::user::{NewUser, ProfileDetails, User};
use crate::schema::notes::dsl::{
    content as notes_content, created_at as notes_created_at, id as notes_id, notes as notes_table,
    title as notes_title, updated_at as notes_updated_at, user_id as notes_user_id,
};
use crate::schema::sessions::dsl::{
    expires_at as sessions_expires_at, id as sessions_id, sessions as sessions_table,
    user_id as sessions_user_id,
};
use crate::schema::users::dsl::{
    email as users_email, password_hash as users_password_hash, updated_at as users_updated_at,
    username as users_username, users as users_table,
};

#[derive(Clone)]
pub struct PgNoteRepository {
    pool: PgPool,
}

impl PgNoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Note>, AppError> {
        let mut conn = connection(&self.pool).await?;

        notes_table
            .filter(notes_user_id.eq(owner_id))
            .order((notes_updated_at.desc(), notes_created_at.desc()))
            .load::<Note>(&mut conn)
            .await
            .map_err(AppError::from_diesel)
    }

    async fn get(&self, note_id: Uuid, owner_id: Uuid) -> Result<Note, AppError> {
        let mut conn = connection(&self.pool).await?;

        notes_table
            .filter(notes_id.eq(note_id).and(notes_user_id.eq(owner_id)))
            .first::<Note>(&mut conn)
            .await
            .map_err(AppError::from_diesel)
    }

    async fn create(&self, owner_id: Uuid, draft: NoteDraft) -> Result<Note, AppError> {
        let new_note = NewNote::new(owner_id, draft, Utc::now());
        let mut conn = connection(&self.pool).await?;

        diesel::insert_into(notes_table)
            .values(&new_note)
            .get_result(&mut conn)
            .await
            .map_err(AppError::from_diesel)
    }

    async fn update(
        &self,
        note_id: Uuid,
        owner_id: Uuid,
        draft: NoteDraft,
    ) -> Result<Note, AppError> {
        let mut conn = connection(&self.pool).await?;

        diesel::update(notes_table.filter(notes_id.eq(note_id).and(notes_user_id.eq(owner_id))))
            .set((
                notes_title.eq(draft.title),
                notes_content.eq(draft.content),
                notes_updated_at.eq(Utc::now()),
            ))
            .get_result(&mut conn)
            .await
            .map_err(AppError::from_diesel)
    }

    async fn delete(&self, note_id: Uuid, owner_id: Uuid) -> Result<(), AppError> {
        let mut conn = connection(&self.pool).await?;

        let affected =
            diesel::delete(notes_table.filter(notes_id.eq(note_id).and(notes_user_id.eq(owner_id))))
                .execute(&mut conn)
                .await
                .map_err(AppError::from_diesel)?;

        if affected == 0 {
            return Err(AppError::NotFound);
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, AppError> {
        let mut conn = connection(&self.pool).await?;

        diesel::insert_into(users_table)
            .values(&user)
            .get_result(&mut conn)
            .await
            .map_err(AppError::from_diesel)
    }

    async fn get(&self, user_id: Uuid) -> Result<User, AppError> {
        let mut conn = connection(&self.pool).await?;

        users_table
            .find(user_id)
            .first::<User>(&mut conn)
            .await
            .map_err(AppError::from_diesel)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let mut conn = connection(&self.pool).await?;

        users_table
            .filter(users_username.eq(username))
            .first::<User>(&mut conn)
            .await
            .optional()
            .map_err(AppError::from_diesel)
    }

    async fn update_details(
        &self,
        user_id: Uuid,
        details: ProfileDetails,
    ) -> Result<User, AppError> {
        let mut conn = connection(&self.pool).await?;

        diesel::update(users_table.find(user_id))
            .set((
                users_username.eq(details.username),
                users_email.eq(details.email),
                users_updated_at.eq(Utc::now()),
            ))
            .get_result(&mut conn)
            .await
            .map_err(AppError::from_diesel)
    }

    async fn set_password_hash(
        &self,
        user_id: Uuid,
        password_hash: String,
    ) -> Result<(), AppError> {
        let mut conn = connection(&self.pool).await?;

        let affected = diesel::update(users_table.find(user_id))
            .set((
                users_password_hash.eq(password_hash),
                users_updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await
            .map_err(AppError::from_diesel)?;

        if affected == 0 {
            return Err(AppError::NotFound);
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: Session) -> Result<(), AppError> {
        let mut conn = connection(&self.pool).await?;

        let purged = diesel::delete(sessions_table.filter(sessions_expires_at.le(Utc::now())))
            .execute(&mut conn)
            .await
            .map_err(AppError::from_diesel)?;
        if purged > 0 {
            tracing::debug!(purged, "Expired sessions removed");
        }

        diesel::insert_into(sessions_table)
            .values(&session)
            .execute(&mut conn)
            .await
            .map_err(AppError::from_diesel)?;

        Ok(())
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<Session>, AppError> {
        let mut conn = connection(&self.pool).await?;

        sessions_table
            .filter(sessions_id.eq(session_id).and(sessions_expires_at.gt(Utc::now())))
            .first::<Session>(&mut conn)
            .await
            .optional()
            .map_err(AppError::from_diesel)
    }

    async fn delete(&self, session_id: Uuid) -> Result<(), AppError> {
        let mut conn = connection(&self.pool).await?;

        diesel::delete(sessions_table.filter(sessions_id.eq(session_id)))
            .execute(&mut conn)
            .await
            .map_err(AppError::from_diesel)?;

        Ok(())
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<usize, AppError> {
        let mut conn = connection(&self.pool).await?;

        diesel::delete(sessions_table.filter(sessions_user_id.eq(user_id)))
            .execute(&mut conn)
            .await
            .map_err(AppError::from_diesel)
    }
}
