use std::sync::{Mutex, PoisonError};

use crate::auth::AuthSession;

use super::SessionStore;

/// Process-local store; the session is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<AuthSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: AuthSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get_session(&self) -> Option<AuthSession> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_session(&self, session: &AuthSession) -> bool {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        true
    }

    fn clear_session(&self) {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;

    #[test]
    fn test_round_trip_and_clear() {
        let session = AuthSession {
            access_token: "T1".to_string(),
            refresh_token: None,
            expires_at: 1_700_000_000,
            user: AuthUser {
                id: "u1".to_string(),
                email: "a@b.com".to_string(),
                full_name: None,
                avatar_url: None,
                role: None,
            },
        };
        let store = MemorySessionStore::new();
        assert!(store.store_session(&session));
        assert_eq!(store.get_session(), Some(session));

        store.clear_session();
        assert_eq!(store.get_session(), None);
        store.clear_session();
    }
}
