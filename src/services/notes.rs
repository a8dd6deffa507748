use std::sync::Arc;

use uuid::Uuid;

use crate::errors::AppError;
use crate::logging::LoggableUuid;
use crate::models::note::{Note, NoteForm};
use crate::repo::NoteRepository;

/// Owner-scoped note operations with form validation in front of the repository.
#[derive(Clone)]
pub struct NoteService {
    repo: Arc<dyn NoteRepository>,
}

impl NoteService {
    pub fn new(repo: Arc<dyn NoteRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, owner_id: Uuid) -> Result<Vec<Note>, AppError> {
        self.repo.list_by_owner(owner_id).await
    }

    pub async fn get(&self, note_id: Uuid, owner_id: Uuid) -> Result<Note, AppError> {
        self.repo.get(note_id, owner_id).await
    }

    #[tracing::instrument(name = "create_note", skip(self, form), fields(owner_id = %LoggableUuid(owner_id)))]
    pub async fn create(&self, owner_id: Uuid, form: &NoteForm) -> Result<Note, AppError> {
        let draft = form.validate()?;
        let note = self.repo.create(owner_id, draft).await?;

        tracing::info!(note_id = %LoggableUuid(note.id), "Note created");
        Ok(note)
    }

    /// Ownership is checked before the input, so a foreign id is reported as
    /// missing even when the submission is invalid.
    #[tracing::instrument(
        name = "update_note",
        skip(self, form),
        fields(note_id = %LoggableUuid(note_id), owner_id = %LoggableUuid(owner_id))
    )]
    pub async fn update(
        &self,
        note_id: Uuid,
        owner_id: Uuid,
        form: &NoteForm,
    ) -> Result<Note, AppError> {
        self.repo.get(note_id, owner_id).await?;
        let draft = form.validate()?;
        let note = self.repo.update(note_id, owner_id, draft).await?;

        tracing::info!("Note updated");
        Ok(note)
    }

    #[tracing::instrument(
        name = "delete_note",
        skip(self),
        fields(note_id = %LoggableUuid(note_id), owner_id = %LoggableUuid(owner_id))
    )]
    pub async fn delete(&self, note_id: Uuid, owner_id: Uuid) -> Result<(), AppError> {
        self.repo.delete(note_id, owner_id).await?;

        tracing::info!("Note deleted");
        Ok(())
    }
}
