use std::sync::Arc;

use argon2::Argon2;

use crate::config::{AppConfig, SessionConfig};
use crate::db::establish_pool;
use crate::repo::{
    InMemoryNoteRepository, InMemorySessionStore, InMemoryUserStore, NoteRepository,
    PgNoteRepository, PgSessionStore, PgUserStore, SessionStore, UserStore,
};
use crate::security::auth::Sessions;
use crate::security::rate_limit::TrustedProxies;
use crate::services::{IdentityService, NoteService, ProfileService};

/// Everything a request handler needs; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub notes: NoteService,
    pub identity: IdentityService,
    pub profiles: ProfileService,
    pub sessions: Sessions,
    pub trusted_proxies: TrustedProxies,
}

impl AppState {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        hasher: Argon2<'static>,
        session: &SessionConfig,
    ) -> Self {
        let identity = IdentityService::new(users, hasher);
        Self {
            notes: NoteService::new(notes),
            profiles: ProfileService::new(identity.clone()),
            identity,
            sessions: Sessions::new(session, sessions),
            trusted_proxies: TrustedProxies::default(),
        }
    }

    pub fn in_memory(hasher: Argon2<'static>, session: &SessionConfig) -> Self {
        Self::new(
            Arc::new(InMemoryNoteRepository::new()),
            Arc::new(InMemoryUserStore::new()),
            Arc::new(InMemorySessionStore::new()),
            hasher,
            session,
        )
    }

    /// Only peers listed here may name the client through forwarding headers.
    pub fn with_trusted_proxies(mut self, proxies: TrustedProxies) -> Self {
        self.trusted_proxies = proxies;
        self
    }

    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let proxies = TrustedProxies::new(config.trusted_proxies.iter().copied());

        let Some(database) = &config.database else {
            tracing::warn!("DATABASE_URL is not set; notes and accounts are kept in memory only");
            return Ok(Self::in_memory(Argon2::default(), &config.session)
                .with_trusted_proxies(proxies));
        };

        let pool = establish_pool(database).await?;
        Ok(Self::new(
            Arc::new(PgNoteRepository::new(pool.clone())),
            Arc::new(PgUserStore::new(pool.clone())),
            Arc::new(PgSessionStore::new(pool)),
            Argon2::default(),
            &config.session,
        )
        .with_trusted_proxies(proxies))
    }
}
