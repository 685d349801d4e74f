//! Session lifecycle and authentication-state manager.
//!
//! `SessionManager` turns sign-in and renewal exchanges into one observable
//! [`AuthState`]. Every update replaces the state wholesale and is pushed
//! synchronously to subscribers in registration order.
//!
//! Operations suspend only while the adapter is on the network. Overlapping
//! calls are not serialized: whichever call publishes last wins, so a slow
//! earlier `login` can overwrite the outcome of a later one. Callers that need
//! strict ordering should not start a new operation while `is_loading` is set.

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::api::{adapter_for, BackendAdapter, CredentialKind};
use crate::config::Config;
use crate::store::{open_store, SessionStore};

use super::listeners::{ListenerRegistry, Subscription};
use super::normalize::{normalize_session, RetainedCredentials};
use super::{AuthError, AuthSession, AuthState, AuthUser, Credentials};

pub struct SessionManager {
    adapter: Box<dyn BackendAdapter>,
    store: Arc<dyn SessionStore>,
    state: RwLock<Arc<AuthState>>,
    listeners: Arc<ListenerRegistry>,
}

impl SessionManager {
    /// Create a manager, seeding state from whatever the store holds.
    /// No network call is made.
    pub fn new(adapter: Box<dyn BackendAdapter>, store: Arc<dyn SessionStore>) -> Self {
        let state = Self::seed_state(store.as_ref());
        debug!(
            flavor = %adapter.flavor(),
            authenticated = state.is_authenticated,
            "Session manager created"
        );

        Self {
            adapter,
            store,
            state: RwLock::new(Arc::new(state)),
            listeners: Arc::new(ListenerRegistry::default()),
        }
    }

    /// Build the adapter and store described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let adapter = adapter_for(config.adapter_config(), config.backend)?;
        let store = open_store(
            config.store,
            config.session_dir()?,
            config.store_passphrase.as_deref(),
        )?;
        Ok(Self::new(adapter, store))
    }

    fn seed_state(store: &dyn SessionStore) -> AuthState {
        if store.is_authenticated() {
            if let Some(session) = store.get_session() {
                return AuthState::authenticated(session);
            }
        }
        AuthState::default()
    }

    // =========================================================================
    // State and subscriptions
    // =========================================================================

    /// Snapshot of the current state
    pub fn get_state(&self) -> AuthState {
        self.current().as_ref().clone()
    }

    fn current(&self) -> Arc<AuthState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Register a listener called on every state replacement.
    pub fn on_state_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(listener));
        Subscription::new(id, &self.listeners)
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Replace the state with an updated copy and notify subscribers.
    fn publish(&self, update: impl FnOnce(&mut AuthState)) {
        let next = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let mut next = guard.as_ref().clone();
            update(&mut next);
            let next = Arc::new(next);
            *guard = Arc::clone(&next);
            next
        };

        debug!(
            authenticated = next.is_authenticated,
            loading = next.is_loading,
            error = ?next.error,
            "Auth state updated"
        );
        self.listeners.notify(&next);
    }

    fn publish_loading(&self) {
        self.publish(|s| {
            s.is_loading = true;
            s.error = None;
        });
    }

    fn publish_signed_out(&self, error: Option<String>) {
        self.publish(|s| s.sign_out(error));
    }

    /// Persist a fresh session and publish it. A failed write costs durability
    /// only; the session stays usable for this process.
    fn establish(&self, session: &AuthSession) {
        if !self.store.store_session(session) {
            warn!("Session could not be persisted; it will not survive a restart");
        }
        let session = session.clone();
        self.publish(move |s| *s = AuthState::authenticated(session));
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        debug!(email = %credentials.email, "Signing in");
        self.publish_loading();

        let outcome = match self.adapter.sign_in(credentials).await {
            Ok(payload) => normalize_session(&payload, RetainedCredentials::default(), now()),
            Err(e) => Err(AuthError::from_login(e)),
        };

        match outcome {
            Ok(session) => {
                self.establish(&session);
                info!(user_id = %session.user.id, "Login successful");
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                self.store.clear_session();
                self.publish_signed_out(Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// End the session. Backend notification is best-effort; the local
    /// session is always cleared.
    pub async fn logout(&self) {
        self.publish(|s| s.is_loading = true);

        let token = self
            .store
            .get_access_token()
            .or_else(|| self.current().session.as_ref().map(|s| s.access_token.clone()));
        if let Some(token) = token {
            if let Err(e) = self.adapter.sign_out(&token).await {
                debug!(error = %e, "Backend sign-out failed, ignoring");
            }
        }

        self.store.clear_session();
        self.publish_signed_out(None);
        info!("Logged out");
    }

    /// Obtain a renewed session with whichever stored credential the adapter
    /// needs. Fails fast, without touching the network or state, when that
    /// credential is missing.
    pub async fn refresh_session(&self) -> Result<AuthSession, AuthError> {
        let kind = self.adapter.renewal_credential();
        let credential = match kind {
            CredentialKind::Refresh => self.store.get_refresh_token(),
            CredentialKind::Access => self.store.get_access_token(),
        };
        let Some(credential) = credential else {
            debug!(%kind, "No stored credential to refresh with");
            return Err(AuthError::NoCredential(kind));
        };

        let stored_refresh = self.store.get_refresh_token();
        let retained = match kind {
            CredentialKind::Refresh => RetainedCredentials {
                access_token: None,
                refresh_token: Some(&credential),
            },
            CredentialKind::Access => RetainedCredentials {
                access_token: Some(&credential),
                refresh_token: stored_refresh.as_deref(),
            },
        };

        self.publish(|s| s.is_loading = true);

        let outcome = match self.adapter.renew(&credential).await {
            Ok(payload) => normalize_session(&payload, retained, now()).map_err(|e| {
                warn!(error = %e, "Renewal returned an unusable payload");
                AuthError::RefreshFailed
            }),
            Err(e) => {
                warn!(error = %e, "Session renewal failed");
                Err(AuthError::from_refresh(&e))
            }
        };

        match outcome {
            Ok(session) => {
                self.establish(&session);
                info!(user_id = %session.user.id, expires_at = session.expires_at, "Session refreshed");
                Ok(session)
            }
            Err(e) => {
                self.store.clear_session();
                self.publish_signed_out(Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Whether the stored session is usable, refreshing it once if it expired.
    pub async fn validate_session(&self) -> bool {
        let Some(session) = self.store.get_session() else {
            return false;
        };

        if !session.access_token.is_empty() && !self.store.is_session_expired(&session) {
            return true;
        }

        info!("Stored session expired, attempting refresh");
        self.refresh_session().await.is_ok()
    }

    /// Validate the stored session on startup; publish the signed-out shape
    /// if it cannot be used. An error left by a failed refresh is kept.
    pub async fn initialize(&self) {
        if !self.validate_session().await {
            self.publish(|s| {
                let error = s.error.take();
                s.sign_out(error);
            });
        }
    }

    /// A token for an outgoing request: the stored one after validation,
    /// else the in-memory session when persistence has failed.
    pub async fn ensure_access_token(&self) -> Option<String> {
        if self.validate_session().await {
            return self.store.get_access_token();
        }
        self.current()
            .session
            .as_ref()
            .filter(|s| s.is_valid())
            .map(|s| s.access_token.clone())
    }

    // =========================================================================
    // Store reads
    // =========================================================================

    pub fn get_access_token(&self) -> Option<String> {
        self.store.get_access_token()
    }

    pub fn get_current_user(&self) -> Option<AuthUser> {
        self.store.get_current_user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::api::{ApiError, BackendFlavor};
    use crate::store::MemorySessionStore;

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    struct Calls {
        sign_in: usize,
        sign_out: Vec<String>,
        renew: Vec<String>,
    }

    /// Adapter that replays scripted responses and records what it was sent
    struct ScriptedAdapter {
        kind: CredentialKind,
        sign_in: Mutex<VecDeque<Result<Value, ApiError>>>,
        sign_out: Mutex<VecDeque<Result<(), ApiError>>>,
        renew: Mutex<VecDeque<Result<Value, ApiError>>>,
        calls: Arc<Mutex<Calls>>,
    }

    impl ScriptedAdapter {
        fn new(kind: CredentialKind) -> Self {
            Self {
                kind,
                sign_in: Mutex::new(VecDeque::new()),
                sign_out: Mutex::new(VecDeque::new()),
                renew: Mutex::new(VecDeque::new()),
                calls: Arc::new(Mutex::new(Calls::default())),
            }
        }

        fn token_refresh() -> Self {
            Self::new(CredentialKind::Refresh)
        }

        fn verify() -> Self {
            Self::new(CredentialKind::Access)
        }

        fn on_sign_in(self, response: Result<Value, ApiError>) -> Self {
            self.sign_in.lock().unwrap().push_back(response);
            self
        }

        fn on_sign_out(self, response: Result<(), ApiError>) -> Self {
            self.sign_out.lock().unwrap().push_back(response);
            self
        }

        fn on_renew(self, response: Result<Value, ApiError>) -> Self {
            self.renew.lock().unwrap().push_back(response);
            self
        }

        fn calls(&self) -> Arc<Mutex<Calls>> {
            Arc::clone(&self.calls)
        }

        fn unscripted() -> ApiError {
            ApiError::InvalidResponse("unscripted call".to_string())
        }
    }

    #[async_trait]
    impl BackendAdapter for ScriptedAdapter {
        fn flavor(&self) -> BackendFlavor {
            match self.kind {
                CredentialKind::Refresh => BackendFlavor::TokenRefresh,
                CredentialKind::Access => BackendFlavor::VerifyRevalidate,
            }
        }

        fn renewal_credential(&self) -> CredentialKind {
            self.kind
        }

        async fn sign_in(&self, _credentials: &Credentials) -> Result<Value, ApiError> {
            self.calls.lock().unwrap().sign_in += 1;
            self.sign_in.lock().unwrap().pop_front().unwrap_or_else(|| Err(Self::unscripted()))
        }

        async fn sign_out(&self, access_token: &str) -> Result<(), ApiError> {
            self.calls.lock().unwrap().sign_out.push(access_token.to_string());
            self.sign_out.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }

        async fn renew(&self, credential: &str) -> Result<Value, ApiError> {
            self.calls.lock().unwrap().renew.push(credential.to_string());
            self.renew.lock().unwrap().pop_front().unwrap_or_else(|| Err(Self::unscripted()))
        }
    }

    /// Store whose writes always fail
    #[derive(Default)]
    struct ReadOnlyStore;

    impl SessionStore for ReadOnlyStore {
        fn get_session(&self) -> Option<AuthSession> {
            None
        }

        fn store_session(&self, _session: &AuthSession) -> bool {
            false
        }

        fn clear_session(&self) {}
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn credentials() -> Credentials {
        Credentials::new("a@b.com", "x")
    }

    fn rejected(status: u16, message: Option<&str>) -> ApiError {
        ApiError::Rejected {
            status,
            message: message.map(str::to_string),
        }
    }

    async fn transport_error() -> ApiError {
        let err = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .unwrap_err();
        ApiError::Network(err)
    }

    fn stored_session(expires_at: i64, refresh_token: Option<&str>) -> AuthSession {
        AuthSession {
            access_token: "T0".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at,
            user: AuthUser {
                id: "u1".to_string(),
                email: "a@b.com".to_string(),
                full_name: None,
                avatar_url: None,
                role: Some("user".to_string()),
            },
        }
    }

    fn manager_with(adapter: ScriptedAdapter, store: &Arc<MemorySessionStore>) -> SessionManager {
        SessionManager::new(Box::new(adapter), Arc::clone(store) as Arc<dyn SessionStore>)
    }

    fn record_states(manager: &SessionManager) -> Arc<Mutex<Vec<AuthState>>> {
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        let _sub = manager.on_state_change(move |state| sink.lock().unwrap().push(state.clone()));
        states
    }

    fn assert_signed_out(state: &AuthState) {
        assert!(!state.is_authenticated);
        assert!(!state.is_loading);
        assert!(state.user.is_none());
        assert!(state.session.is_none());
    }

    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    #[test]
    fn test_new_seeds_state_from_valid_stored_session() {
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() + 600, None)));
        let manager = manager_with(ScriptedAdapter::token_refresh(), &store);

        let state = manager.get_state();
        assert!(state.is_authenticated);
        assert!(!state.is_loading);
        assert_eq!(state.user.map(|u| u.id), Some("u1".to_string()));
        assert_eq!(state.session.map(|s| s.access_token), Some("T0".to_string()));
        assert_eq!(state.error, None);
    }

    #[test]
    fn test_new_with_expired_session_starts_signed_out() {
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() - 10, Some("R0"))));
        let manager = manager_with(ScriptedAdapter::token_refresh(), &store);

        let state = manager.get_state();
        assert_signed_out(&state);
        assert!(state.is_consistent());
        assert!(store.get_session().is_some());
    }

    // -------------------------------------------------------------------------
    // Login
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_success_defaults_expiry_and_role() {
        let adapter = ScriptedAdapter::token_refresh().on_sign_in(Ok(json!({
            "access_token": "T1",
            "user": { "id": "u1", "email": "a@b.com" }
        })));
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_with(adapter, &store);
        let states = record_states(&manager);

        let before = now();
        let session = manager.login(&credentials()).await.unwrap();
        let after = now();

        assert_eq!(session.access_token, "T1");
        assert!(session.expires_at >= before + 86_400 && session.expires_at <= after + 86_400);
        assert_eq!(session.user.role.as_deref(), Some("user"));

        let state = manager.get_state();
        assert!(state.is_authenticated);
        assert!(!state.session.as_ref().unwrap().access_token.is_empty());
        assert_eq!(state.user.as_ref().unwrap().role(), "user");
        assert_eq!(store.get_session(), Some(session));

        let states = states.lock().unwrap();
        assert_eq!(states.len(), 2);
        assert!(states[0].is_loading);
        assert_eq!(states[0].error, None);
        assert!(states[1].is_authenticated && !states[1].is_loading);
    }

    #[tokio::test]
    async fn test_login_rejected_uses_backend_message_and_clears() {
        let adapter = ScriptedAdapter::token_refresh()
            .on_sign_in(Err(rejected(401, Some("Invalid login credentials"))));
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() + 600, None)));
        let manager = manager_with(adapter, &store);

        let err = manager.login(&credentials()).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");

        let state = manager.get_state();
        assert_signed_out(&state);
        assert_eq!(state.error.as_deref(), Some("Invalid login credentials"));
        assert!(store.get_session().is_none());
    }

    #[tokio::test]
    async fn test_login_rejected_without_body_templates_status() {
        let adapter = ScriptedAdapter::token_refresh().on_sign_in(Err(rejected(500, None)));
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_with(adapter, &store);

        let err = manager.login(&credentials()).await.unwrap_err();
        assert_eq!(err, AuthError::Rejected("Login failed: 500".to_string()));
        assert_eq!(manager.get_state().error.as_deref(), Some("Login failed: 500"));
    }

    #[tokio::test]
    async fn test_login_malformed_success_payload_fails() {
        let adapter = ScriptedAdapter::token_refresh().on_sign_in(Ok(json!({ "ok": true })));
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_with(adapter, &store);

        assert!(manager.login(&credentials()).await.is_err());
        let state = manager.get_state();
        assert_signed_out(&state);
        assert!(!state.error.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_login_transport_error_surfaces_message() {
        let adapter = ScriptedAdapter::token_refresh().on_sign_in(Err(transport_error().await));
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_with(adapter, &store);

        let err = manager.login(&credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::Transport(_)));
        let state = manager.get_state();
        assert_signed_out(&state);
        assert!(state.error.unwrap().starts_with("Network error"));
    }

    #[tokio::test]
    async fn test_login_persistence_failure_is_not_fatal() {
        let adapter = ScriptedAdapter::token_refresh().on_sign_in(Ok(json!({
            "access_token": "T1",
            "user": { "id": "u1", "email": "a@b.com" }
        })));
        let manager = SessionManager::new(Box::new(adapter), Arc::new(ReadOnlyStore));

        let session = manager.login(&credentials()).await.unwrap();
        assert_eq!(session.access_token, "T1");
        assert!(manager.get_state().is_authenticated);
        assert_eq!(manager.get_access_token(), None);
        assert_eq!(manager.ensure_access_token().await.as_deref(), Some("T1"));
    }

    // -------------------------------------------------------------------------
    // Logout
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_logout_twice_reaches_same_state() {
        let adapter = ScriptedAdapter::token_refresh().on_sign_out(Err(rejected(500, None)));
        let calls = adapter.calls();
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() + 600, Some("R0"))));
        let manager = manager_with(adapter, &store);

        manager.logout().await;
        let first = manager.get_state();
        manager.logout().await;
        let second = manager.get_state();

        assert_eq!(first, second);
        assert_signed_out(&first);
        assert_eq!(first.error, None);
        assert!(store.get_session().is_none());
        assert_eq!(calls.lock().unwrap().sign_out, vec!["T0".to_string()]);
    }

    #[tokio::test]
    async fn test_logout_swallows_transport_error() {
        let adapter = ScriptedAdapter::verify().on_sign_out(Err(transport_error().await));
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() + 600, None)));
        let manager = manager_with(adapter, &store);
        let states = record_states(&manager);

        manager.logout().await;

        assert_signed_out(&manager.get_state());
        assert_eq!(manager.get_state().error, None);
        let states = states.lock().unwrap();
        assert!(states.first().unwrap().is_loading);
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails_fast() {
        let adapter = ScriptedAdapter::token_refresh();
        let calls = adapter.calls();
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() - 1, None)));
        let manager = manager_with(adapter, &store);
        let states = record_states(&manager);
        let before = manager.get_state();

        let err = manager.refresh_session().await.unwrap_err();
        assert_eq!(err.to_string(), "No refresh token available");
        assert_eq!(*calls.lock().unwrap(), Calls::default());
        assert!(states.lock().unwrap().is_empty());
        assert_eq!(manager.get_state(), before);
    }

    #[tokio::test]
    async fn test_refresh_without_access_token_fails_fast() {
        let adapter = ScriptedAdapter::verify();
        let calls = adapter.calls();
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_with(adapter, &store);

        let err = manager.refresh_session().await.unwrap_err();
        assert_eq!(err, AuthError::NoCredential(CredentialKind::Access));
        assert_eq!(err.to_string(), "No access token available");
        assert!(calls.lock().unwrap().renew.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_token_flavor_exchanges_refresh_token() {
        let adapter = ScriptedAdapter::token_refresh().on_renew(Ok(json!({
            "session": {
                "access_token": "T2",
                "refresh_token": "R2",
                "expires_at": now() + 3600
            },
            "user": { "id": "u1", "email": "a@b.com" }
        })));
        let calls = adapter.calls();
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() - 1, Some("R0"))));
        let manager = manager_with(adapter, &store);

        let session = manager.refresh_session().await.unwrap();
        assert_eq!(session.access_token, "T2");
        assert_eq!(session.refresh_token.as_deref(), Some("R2"));
        assert_eq!(calls.lock().unwrap().renew, vec!["R0".to_string()]);
        assert_eq!(store.get_session(), Some(session));
        assert!(manager.get_state().is_authenticated);
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_omitted() {
        let adapter = ScriptedAdapter::token_refresh().on_renew(Ok(json!({
            "accessToken": "T2",
            "user": { "id": "u1", "email": "a@b.com" }
        })));
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() - 1, Some("R0"))));
        let manager = manager_with(adapter, &store);

        let session = manager.refresh_session().await.unwrap();
        assert_eq!(session.refresh_token.as_deref(), Some("R0"));
    }

    #[tokio::test]
    async fn test_verify_flavor_revalidates_access_token() {
        let adapter = ScriptedAdapter::verify().on_renew(Ok(json!({
            "user": {
                "id": "u1",
                "email": "a@b.com",
                "user_metadata": { "full_name": "Ada Lovelace" }
            }
        })));
        let calls = adapter.calls();
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() - 1, None)));
        let manager = manager_with(adapter, &store);

        let session = manager.refresh_session().await.unwrap();
        assert_eq!(calls.lock().unwrap().renew, vec!["T0".to_string()]);
        assert_eq!(session.access_token, "T0");
        assert!(session.expires_at > now());
        assert_eq!(session.user.full_name.as_deref(), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_verify_flavor_401_clears_session_as_expired() {
        let adapter = ScriptedAdapter::verify().on_renew(Err(rejected(401, Some("jwt expired"))));
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() + 600, None)));
        let manager = manager_with(adapter, &store);

        let err = manager.refresh_session().await.unwrap_err();
        assert_eq!(err, AuthError::SessionExpired);
        assert!(store.get_session().is_none());

        let state = manager.get_state();
        assert_signed_out(&state);
        assert_eq!(state.error.as_deref(), Some("Session expired"));
    }

    #[tokio::test]
    async fn test_refresh_transport_error_reports_refresh_failed() {
        let adapter = ScriptedAdapter::token_refresh().on_renew(Err(transport_error().await));
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() - 1, Some("R0"))));
        let manager = manager_with(adapter, &store);

        let err = manager.refresh_session().await.unwrap_err();
        assert_eq!(err, AuthError::RefreshFailed);
        assert!(store.get_session().is_none());
        assert_eq!(manager.get_state().error.as_deref(), Some("Session refresh failed"));
    }

    // -------------------------------------------------------------------------
    // Validate / initialize
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_validate_without_session_is_false_and_quiet() {
        let adapter = ScriptedAdapter::token_refresh();
        let calls = adapter.calls();
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_with(adapter, &store);
        let states = record_states(&manager);

        assert!(!manager.validate_session().await);
        assert!(states.lock().unwrap().is_empty());
        assert_eq!(*calls.lock().unwrap(), Calls::default());
    }

    #[tokio::test]
    async fn test_validate_unexpired_session_skips_network() {
        let adapter = ScriptedAdapter::token_refresh();
        let calls = adapter.calls();
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() + 60, Some("R0"))));
        let manager = manager_with(adapter, &store);

        assert!(manager.validate_session().await);
        assert_eq!(*calls.lock().unwrap(), Calls::default());
    }

    #[tokio::test]
    async fn test_validate_at_expiry_boundary_refreshes() {
        let adapter = ScriptedAdapter::token_refresh().on_renew(Ok(json!({
            "access_token": "T2",
            "user": { "id": "u1", "email": "a@b.com" }
        })));
        let calls = adapter.calls();
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now(), Some("R0"))));
        let manager = manager_with(adapter, &store);

        assert!(manager.validate_session().await);
        assert_eq!(calls.lock().unwrap().renew.len(), 1);
        assert_eq!(manager.get_access_token().as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn test_validate_returns_refresh_failure() {
        let adapter = ScriptedAdapter::token_refresh().on_renew(Err(rejected(400, None)));
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() - 5, Some("R0"))));
        let manager = manager_with(adapter, &store);

        assert!(!manager.validate_session().await);
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_initialize_without_session_publishes_signed_out() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_with(ScriptedAdapter::token_refresh(), &store);
        let states = record_states(&manager);

        manager.initialize().await;
        manager.initialize().await;

        let states = states.lock().unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0], states[1]);
        assert_signed_out(&states[0]);
        assert_eq!(states[0].error, None);
    }

    #[tokio::test]
    async fn test_initialize_keeps_refresh_error() {
        let adapter = ScriptedAdapter::verify().on_renew(Err(rejected(401, None)));
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() - 5, None)));
        let manager = manager_with(adapter, &store);

        manager.initialize().await;
        let state = manager.get_state();
        assert_signed_out(&state);
        assert_eq!(state.error.as_deref(), Some("Session expired"));
    }

    #[tokio::test]
    async fn test_initialize_with_valid_session_keeps_state() {
        let store = Arc::new(MemorySessionStore::with_session(stored_session(now() + 600, None)));
        let manager = manager_with(ScriptedAdapter::verify(), &store);
        let states = record_states(&manager);

        manager.initialize().await;
        assert!(manager.get_state().is_authenticated);
        assert!(states.lock().unwrap().is_empty());
    }

    // -------------------------------------------------------------------------
    // Subscriptions and accessors
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_unsubscribed_listener_stops_receiving() {
        let adapter = ScriptedAdapter::token_refresh();
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_with(adapter, &store);

        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let sub = manager.on_state_change(move |_| *sink.lock().unwrap() += 1);
        assert_eq!(manager.subscriber_count(), 1);

        manager.logout().await;
        assert_eq!(*count.lock().unwrap(), 2);

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        manager.logout().await;
        assert_eq!(*count.lock().unwrap(), 2);
        assert_eq!(manager.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_every_settled_state_is_consistent() {
        let adapter = ScriptedAdapter::token_refresh()
            .on_sign_in(Ok(json!({
                "access_token": "T1",
                "refresh_token": "R1",
                "expires_at": now() - 1,
                "user": { "id": "u1", "email": "a@b.com" }
            })))
            .on_renew(Err(rejected(401, None)))
            .on_sign_in(Err(rejected(403, None)));
        let store = Arc::new(MemorySessionStore::new());
        let manager = Arc::new(manager_with(adapter, &store));
        let states = record_states(&manager);

        let reader = Arc::clone(&manager);
        let _sub = manager.on_state_change(move |published| {
            assert_eq!(&reader.get_state(), published);
        });

        manager.login(&credentials()).await.unwrap();
        assert!(!manager.validate_session().await);
        assert!(manager.login(&credentials()).await.is_err());
        manager.logout().await;

        let states = states.lock().unwrap();
        assert!(states.len() >= 8);
        for state in states.iter().filter(|s| !s.is_loading) {
            assert!(state.is_consistent(), "inconsistent state: {state:?}");
        }
    }

    #[test]
    fn test_accessors_read_store_directly() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_with(ScriptedAdapter::token_refresh(), &store);
        assert_eq!(manager.get_access_token(), None);
        assert!(!manager.is_authenticated());

        store.store_session(&stored_session(now() + 600, Some("R0")));
        assert_eq!(manager.get_access_token().as_deref(), Some("T0"));
        assert_eq!(manager.get_current_user().map(|u| u.email), Some("a@b.com".to_string()));
        assert!(manager.is_authenticated());
        assert!(!manager.get_state().is_authenticated);
    }
}
