use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use super::{AuthBackend, AuthError, Clock, DecodedToken, IdentityDecoder, SystemClock, TokenStore};
use crate::models::{Credentials, Registration, UserIdentity};

/// Derived authentication state. `user` and `raw_token` always change together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub raw_token: Option<String>,
    pub user: Option<UserIdentity>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// Bumped whenever the token changes. A response fetched under an older
    /// revision belongs to a session that no longer exists.
    pub revision: u64,
}

impl SessionState {
    /// State before the stored token has been examined.
    pub fn loading() -> Self {
        Self {
            raw_token: None,
            user: None,
            is_authenticated: false,
            is_loading: true,
            expires_at: None,
            revision: 0,
        }
    }

    /// Time left before the token expires, zero if unauthenticated.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at
            .map(|exp| (exp - now).max(Duration::zero()))
            .unwrap_or_else(Duration::zero)
    }

    /// Minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.time_until_expiry(now).num_minutes()
    }

    fn authenticate(&mut self, token: String, decoded: DecodedToken) {
        if self.raw_token.as_deref() != Some(token.as_str()) {
            self.revision += 1;
        }
        self.raw_token = Some(token);
        self.user = Some(decoded.identity);
        self.is_authenticated = true;
        self.is_loading = false;
        self.expires_at = Some(decoded.expires_at);
    }

    fn reset(&mut self) {
        if self.raw_token.is_some() {
            self.revision += 1;
        }
        self.raw_token = None;
        self.user = None;
        self.is_authenticated = false;
        self.is_loading = false;
        self.expires_at = None;
    }
}

/// Single owner of the session lifecycle.
///
/// Every token change (restore, login, logout) runs store write, decode and
/// state update under one lock, so readers never observe a token paired with
/// another token's identity. Overlapping logins resolve last-write-wins.
pub struct SessionController<S, B, C = SystemClock> {
    store: S,
    backend: B,
    clock: C,
    state: Mutex<SessionState>,
}

impl<S: TokenStore, B: AuthBackend> SessionController<S, B, SystemClock> {
    /// Create a controller and restore any persisted session.
    pub fn new(store: S, backend: B) -> Self {
        Self::with_clock(store, backend, SystemClock)
    }
}

impl<S: TokenStore, B: AuthBackend, C: Clock> SessionController<S, B, C> {
    pub fn with_clock(store: S, backend: B, clock: C) -> Self {
        let controller = Self {
            store,
            backend,
            clock,
            state: Mutex::new(SessionState::loading()),
        };
        controller.reload();
        controller
    }

    /// Re-read the store and recompute derived state from whatever it holds.
    pub fn reload(&self) {
        let mut state = self.lock_state();
        match self.store.get() {
            None => {
                debug!("No stored session token");
                state.reset();
            }
            Some(token) => match IdentityDecoder::validate(&token, self.clock.now()) {
                Ok(decoded) => {
                    info!(
                        username = %decoded.identity.username,
                        role = %decoded.identity.role,
                        expires_at = %decoded.expires_at,
                        "Session restored"
                    );
                    state.authenticate(token, decoded);
                }
                Err(e) => {
                    warn!(error = %e, "Stored session token is unusable, logging out");
                    self.clear_store();
                    state.reset();
                }
            },
        }
    }

    /// Snapshot of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock_state().is_authenticated
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.lock_state().user.clone()
    }

    /// The raw token to attach as a bearer credential, if signed in.
    pub fn bearer_token(&self) -> Option<String> {
        let state = self.lock_state();
        if state.is_authenticated {
            state.raw_token.clone()
        } else {
            None
        }
    }

    /// Log out if the current token has expired since it was loaded.
    /// Returns true if the session was ended.
    pub fn check_expiry(&self) -> bool {
        let mut state = self.lock_state();
        match state.expires_at {
            Some(exp) if state.is_authenticated && exp <= self.clock.now() => {
                info!(expired_at = %exp, "Session expired");
                self.clear_store();
                state.reset();
                true
            }
            _ => false,
        }
    }

    /// Authenticate against the backend and adopt the issued token.
    ///
    /// On any error the store and state are left exactly as they were.
    pub async fn login(&self, credentials: &Credentials) -> Result<UserIdentity, AuthError> {
        debug!(username = %credentials.username, "Attempting login");

        let response = self.backend.login(credentials).await.map_err(|e| {
            warn!(username = %credentials.username, error = %e, "Login failed");
            AuthError::from(e)
        })?;

        self.adopt_token(response.access_token)
    }

    /// Create an account. The session state is not touched; callers that want
    /// to be signed in afterwards call `login`.
    pub async fn register(&self, registration: &Registration) -> Result<(), AuthError> {
        debug!(username = %registration.username, role = %registration.role, "Registering account");

        self.backend.register(registration).await.map_err(|e| {
            warn!(username = %registration.username, error = %e, "Registration failed");
            AuthError::from(e)
        })?;

        info!(username = %registration.username, "Account registered");
        Ok(())
    }

    /// End the session. Safe to call when already logged out.
    pub fn logout(&self) {
        let mut state = self.lock_state();
        self.clear_store();
        if state.is_authenticated {
            info!("Logged out");
        }
        state.reset();
    }

    fn adopt_token(&self, token: String) -> Result<UserIdentity, AuthError> {
        // A freshly issued token must decode and be unexpired; anything else
        // means client and server disagree on the token format.
        let decoded = IdentityDecoder::validate(&token, self.clock.now()).map_err(|e| {
            error!(error = %e, "Backend issued an unusable token");
            AuthError::ContractViolation(e.to_string())
        })?;

        let mut state = self.lock_state();
        self.store.set(&token).map_err(|e| {
            error!(error = %e, "Failed to persist session token");
            e
        })?;

        let identity = decoded.identity.clone();
        info!(username = %identity.username, role = %identity.role, "Login successful");
        state.authenticate(token, decoded);
        Ok(identity)
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored session token");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;
    use crate::api::ApiError;
    use crate::auth::token::encode_test_token;
    use crate::auth::{FixedClock, MemoryTokenStore, StoreError};
    use crate::models::AuthResponse;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn token_for(username: &str, role: &str, exp: DateTime<Utc>) -> String {
        encode_test_token(&json!({"sub": username, "role": role, "exp": exp.timestamp()}))
    }

    /// Backend that replays queued results. Logins for a gated username
    /// wait until the test releases them.
    #[derive(Default)]
    struct FakeBackend {
        logins: std::sync::Mutex<VecDeque<Result<String, ApiError>>>,
        gated: std::sync::Mutex<HashMap<String, (oneshot::Receiver<()>, String)>>,
        register_result: std::sync::Mutex<Option<ApiError>>,
        register_calls: std::sync::atomic::AtomicUsize,
    }

    impl FakeBackend {
        fn issuing(token: String) -> Self {
            let backend = Self::default();
            backend.logins.lock().unwrap().push_back(Ok(token));
            backend
        }

        fn failing(err: ApiError) -> Self {
            let backend = Self::default();
            backend.logins.lock().unwrap().push_back(Err(err));
            backend
        }

        fn next_login(&self) -> Result<String, ApiError> {
            self.logins
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected login call")
        }

        fn gate(&self, username: &str, gate: oneshot::Receiver<()>, token: String) {
            self.gated
                .lock()
                .unwrap()
                .insert(username.to_string(), (gate, token));
        }
    }

    impl AuthBackend for FakeBackend {
        async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
            let gated = self.gated.lock().unwrap().remove(&credentials.username);
            let result = match gated {
                Some((gate, token)) => {
                    let _ = gate.await;
                    Ok(token)
                }
                None => self.next_login(),
            };
            result.map(|access_token| AuthResponse {
                access_token,
                token_type: Some("bearer".to_string()),
            })
        }

        async fn register(&self, _registration: &Registration) -> Result<(), ApiError> {
            self.register_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            match self.register_result.lock().unwrap().take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore;

    impl TokenStore for ReadOnlyStore {
        fn get(&self) -> Option<String> {
            None
        }

        fn set(&self, _token: &str) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }

        fn clear(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn controller(
        store: MemoryTokenStore,
        backend: FakeBackend,
    ) -> SessionController<MemoryTokenStore, FakeBackend, FixedClock> {
        SessionController::with_clock(store, backend, FixedClock(now()))
    }

    fn credentials() -> Credentials {
        Credentials::new("alice", "secret")
    }

    // -------------------------------------------------------------------------
    // Startup
    // -------------------------------------------------------------------------

    #[test]
    fn test_fresh_start_without_token() {
        let session = controller(MemoryTokenStore::new(), FakeBackend::default());
        let state = session.snapshot();
        assert!(!state.is_loading);
        assert!(!state.is_authenticated);
        assert_eq!(state.user, None);
        assert_eq!(session.bearer_token(), None);
    }

    #[test]
    fn test_restores_valid_token() {
        let token = token_for("alice", "Planner", now() + Duration::hours(1));
        let session = controller(MemoryTokenStore::with_token(token.clone()), FakeBackend::default());

        let state = session.snapshot();
        assert!(!state.is_loading);
        assert!(state.is_authenticated);
        let user = state.user.clone().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, "Planner");
        assert_eq!(session.bearer_token(), Some(token));
        assert_eq!(state.minutes_until_expiry(now()), 60);
    }

    #[test]
    fn test_expired_token_is_cleared() {
        let token = token_for("alice", "Planner", now() - Duration::hours(1));
        let session = controller(MemoryTokenStore::with_token(token), FakeBackend::default());

        let state = session.snapshot();
        assert!(!state.is_authenticated);
        assert!(!state.is_loading);
        assert_eq!(session.store.get(), None);
    }

    #[test]
    fn test_token_expiring_now_is_not_authenticated() {
        let token = token_for("alice", "Planner", now());
        let session = controller(MemoryTokenStore::with_token(token), FakeBackend::default());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_malformed_token_is_cleared() {
        let session = controller(MemoryTokenStore::with_token("not-a-token"), FakeBackend::default());
        assert!(!session.is_authenticated());
        assert!(!session.snapshot().is_loading);
        assert_eq!(session.store.get(), None);
    }

    #[test]
    fn test_authenticated_iff_decodes_and_unexpired() {
        let cases = vec![
            (token_for("a", "r", now() + Duration::seconds(1)), true),
            (token_for("a", "r", now()), false),
            (token_for("a", "r", now() - Duration::seconds(1)), false),
            (encode_test_token(&json!({"sub": "a", "exp": now().timestamp() + 60})), false),
            ("x.y.z".to_string(), false),
        ];
        for (token, expected) in cases {
            let session = controller(MemoryTokenStore::with_token(token.clone()), FakeBackend::default());
            assert_eq!(session.is_authenticated(), expected, "token {}", token);
        }
    }

    // -------------------------------------------------------------------------
    // Logout
    // -------------------------------------------------------------------------

    #[test]
    fn test_logout_is_idempotent() {
        let token = token_for("alice", "Planner", now() + Duration::hours(1));
        let session = controller(MemoryTokenStore::with_token(token), FakeBackend::default());
        assert!(session.is_authenticated());

        session.logout();
        let once = session.snapshot();
        session.logout();
        let twice = session.snapshot();

        assert_eq!(once, twice);
        assert!(!twice.is_authenticated);
        assert_eq!(twice.user, None);
        assert_eq!(session.store.get(), None);
    }

    #[test]
    fn test_logout_when_never_logged_in() {
        let session = controller(MemoryTokenStore::new(), FakeBackend::default());
        session.logout();
        assert!(!session.is_authenticated());
        assert_eq!(session.snapshot().revision, 0);
    }

    #[test]
    fn test_check_expiry_ends_session() {
        let expires = now() + Duration::minutes(5);
        let token = token_for("alice", "Planner", expires);
        let store = MemoryTokenStore::with_token(token);
        let session = SessionController::with_clock(store, FakeBackend::default(), FixedClock(now()));
        assert!(!session.check_expiry());
        assert!(session.is_authenticated());

        let later = SessionController {
            store: MemoryTokenStore::with_token(session.bearer_token().unwrap()),
            backend: FakeBackend::default(),
            clock: FixedClock(expires),
            state: Mutex::new(session.snapshot()),
        };
        assert!(later.check_expiry());
        assert!(!later.is_authenticated());
        assert_eq!(later.store.get(), None);
    }

    // -------------------------------------------------------------------------
    // Login
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_success() {
        let issued = token_for("alice", "Planner", now() + Duration::hours(1));
        let session = controller(MemoryTokenStore::new(), FakeBackend::issuing(issued.clone()));
        assert!(!session.is_authenticated());
        let before = session.snapshot().revision;

        let user = session.login(&credentials()).await.unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, "Planner");

        let state = session.snapshot();
        assert!(state.is_authenticated);
        assert_eq!(state.raw_token.as_deref(), Some(issued.as_str()));
        assert_eq!(state.revision, before + 1);
        assert_eq!(session.store.get(), Some(issued.clone()));

        // The stored token decodes to the same identity
        let stored = IdentityDecoder::decode(&session.store.get().unwrap()).unwrap();
        assert_eq!(Some(stored.identity), state.user);
    }

    #[tokio::test]
    async fn test_login_rejected_keeps_state() {
        let backend = FakeBackend::failing(ApiError::Unauthorized("Invalid credentials".to_string()));
        let session = controller(MemoryTokenStore::new(), backend);
        let before = session.snapshot();

        let err = session.login(&credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::Credential(ref m) if m == "Invalid credentials"));
        assert_eq!(session.snapshot(), before);
        assert_eq!(session.store.get(), None);
    }

    #[tokio::test]
    async fn test_failed_login_keeps_existing_session() {
        let existing = token_for("bob", "Developer", now() + Duration::hours(1));
        let backend = FakeBackend::failing(ApiError::BadRequest("Invalid credentials".to_string()));
        let session = controller(MemoryTokenStore::with_token(existing.clone()), backend);

        assert!(session.login(&credentials()).await.is_err());
        assert_eq!(session.user().unwrap().username, "bob");
        assert_eq!(session.store.get(), Some(existing));
    }

    #[tokio::test]
    async fn test_login_with_malformed_issued_token_is_contract_violation() {
        let session = controller(MemoryTokenStore::new(), FakeBackend::issuing("garbage".to_string()));
        let err = session.login(&credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::ContractViolation(_)));
        assert!(!session.is_authenticated());
        assert_eq!(session.store.get(), None);
    }

    #[tokio::test]
    async fn test_login_with_expired_issued_token_is_contract_violation() {
        let issued = token_for("alice", "Planner", now() - Duration::minutes(1));
        let session = controller(MemoryTokenStore::new(), FakeBackend::issuing(issued));
        let err = session.login(&credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::ContractViolation(_)));
        assert_eq!(session.store.get(), None);
    }

    #[tokio::test]
    async fn test_login_storage_failure_leaves_state_untouched() {
        let issued = token_for("alice", "Planner", now() + Duration::hours(1));
        let session = SessionController::with_clock(
            ReadOnlyStore,
            FakeBackend::issuing(issued),
            FixedClock(now()),
        );
        let err = session.login(&credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_overlapping_logins_last_write_wins() {
        let first = token_for("first", "Planner", now() + Duration::hours(1));
        let second = token_for("second", "Developer", now() + Duration::hours(2));

        let backend = FakeBackend::default();
        let (release_first, gate_first) = oneshot::channel();
        let (release_second, gate_second) = oneshot::channel();
        backend.gate("first", gate_first, first.clone());
        backend.gate("second", gate_second, second.clone());

        let session = Arc::new(controller(MemoryTokenStore::new(), backend));

        let a = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.login(&Credentials::new("first", "pw")).await }
        });
        let b = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.login(&Credentials::new("second", "pw")).await }
        });

        // The second request completes first, then the first one lands.
        release_second.send(()).unwrap();
        b.await.unwrap().unwrap();
        assert_eq!(session.user().unwrap().username, "second");

        release_first.send(()).unwrap();
        a.await.unwrap().unwrap();

        let state = session.snapshot();
        assert_eq!(state.raw_token.as_deref(), Some(first.as_str()));
        assert_eq!(state.user.unwrap().username, "first");
        assert_eq!(session.store.get(), Some(first));
    }

    // -------------------------------------------------------------------------
    // Register
    // -------------------------------------------------------------------------

    fn registration() -> Registration {
        Registration {
            username: "carol".to_string(),
            password: "pw".to_string(),
            email: None,
            role: "Planner".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_does_not_authenticate() {
        let session = controller(MemoryTokenStore::new(), FakeBackend::default());
        session.register(&registration()).await.unwrap();
        assert!(!session.is_authenticated());
        assert_eq!(session.store.get(), None);
        assert_eq!(
            session
                .backend
                .register_calls
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_register_failure_propagates() {
        let backend = FakeBackend::default();
        *backend.register_result.lock().unwrap() =
            Some(ApiError::BadRequest("Username already registered".to_string()));
        let existing = token_for("bob", "Developer", now() + Duration::hours(1));
        let session = controller(MemoryTokenStore::with_token(existing), backend);

        let err = session.register(&registration()).await.unwrap_err();
        assert_eq!(err.user_message(), "Username already registered");
        assert_eq!(session.user().unwrap().username, "bob");
    }
}
