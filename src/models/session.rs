use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::models::user::User;
use crate::schema::sessions;

/// Server-side record of a login. The session cookie is only honored while
/// its record exists and has not expired.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Associations, Insertable)]
#[diesel(table_name = sessions)]
#[diesel(belongs_to(User))]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: Uuid, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expires_after_ttl() {
        let now = Utc::now();
        let session = Session::new(Uuid::new_v4(), now, Duration::hours(1));

        assert!(!session.is_expired(now));
        assert!(!session.is_expired(now + Duration::minutes(59)));
        assert!(session.is_expired(now + Duration::hours(1)));
    }
}
