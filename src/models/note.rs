use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::notes;

use super::{FieldErrors, max_chars, required};
use crate::models::user::User;

pub const TITLE_MAX_CHARS: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Associations, Serialize)]
#[diesel(table_name = notes)]
#[diesel(belongs_to(User))]
pub struct Note {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notes)]
pub struct NewNote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewNote {
    pub fn new(user_id: Uuid, draft: NoteDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: draft.title,
            content: draft.content,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn into_note(self) -> Note {
        Note {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            content: self.content,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Validated, trimmed note fields ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Raw note input as submitted by the create and edit forms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct NoteForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl NoteForm {
    pub fn validate(&self) -> Result<NoteDraft, FieldErrors> {
        let mut errors = FieldErrors::new();

        let title = errors.check(
            "title",
            required(&self.title).and_then(|title| max_chars(title, TITLE_MAX_CHARS)),
        );
        let content = errors.check("content", required(&self.content));

        match (title, content) {
            (Some(title), Some(content)) if errors.is_empty() => Ok(NoteDraft { title, content }),
            _ => Err(errors),
        }
    }
}

impl From<&Note> for NoteForm {
    fn from(note: &Note) -> Self {
        Self {
            title: note.title.clone(),
            content: note.content.clone(),
        }
    }
}
