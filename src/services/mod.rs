pub mod identity;
pub mod notes;
pub mod profile;

pub use identity::IdentityService;
pub use notes::NoteService;
pub use profile::ProfileService;

/// One-time confirmation shown on the page following a successful action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    NoteCreated,
    NoteUpdated,
    NoteDeleted,
    ProfileUpdated,
    PasswordChanged,
}

impl Notice {
    pub const ALL: [Notice; 5] = [
        Notice::NoteCreated,
        Notice::NoteUpdated,
        Notice::NoteDeleted,
        Notice::ProfileUpdated,
        Notice::PasswordChanged,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Notice::NoteCreated => "note_created",
            Notice::NoteUpdated => "note_updated",
            Notice::NoteDeleted => "note_deleted",
            Notice::ProfileUpdated => "profile_updated",
            Notice::PasswordChanged => "password_changed",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|notice| notice.code() == code)
    }

    pub fn text(&self) -> &'static str {
        match self {
            Notice::NoteCreated => "Note created.",
            Notice::NoteUpdated => "Note updated.",
            Notice::NoteDeleted => "Note deleted.",
            Notice::ProfileUpdated => "Your profile was updated successfully.",
            Notice::PasswordChanged => "Your password was updated successfully.",
        }
    }
}
