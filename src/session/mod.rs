//! Session state: who is logged in and with which token
//!
//! The [`SessionStore`] is the single owner of the current [`Session`]. It
//! talks to an [`AuthClient`] for login/register/logout, persists the token
//! through a [`TokenStore`], and hands the token to the realtime channel as
//! a [`CredentialSource`].

mod demo;
mod user;

pub use demo::{
    display_name_from_email, mock_token, offline_identity, registered_identity, DemoAccount,
    DEMO_ACCOUNTS, MOCK_TOKEN_PREFIX,
};
pub use user::{Role, User, UserUpdate};

use crate::auth::{AuthClient, AuthError, AuthMode, HttpAuthClient, LoginRequest, RegisterRequest};
use crate::config::HarvestConfig;
use crate::storage::{FileTokenStore, StorageError, TokenStore};
use harvest_client::CredentialSource;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Snapshot of the authentication state
#[derive(Clone, Default, PartialEq)]
pub struct Session {
    pub user: Option<User>,
    pub token: Option<String>,
}

impl Session {
    /// A token alone counts; the profile is not persisted across restarts
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

pub struct SessionStore {
    mode: AuthMode,
    auth: Arc<dyn AuthClient>,
    storage: Arc<dyn TokenStore>,
    session: RwLock<Session>,
}

impl SessionStore {
    /// Restore the persisted token, if any
    pub async fn open(
        mode: AuthMode,
        auth: Arc<dyn AuthClient>,
        storage: Arc<dyn TokenStore>,
    ) -> Self {
        let token = match storage.load().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to load stored token, starting unauthenticated");
                None
            }
        };

        if token.is_some() {
            debug!("Restored session token");
        }

        Self {
            mode,
            auth,
            storage,
            session: RwLock::new(Session { user: None, token }),
        }
    }

    /// HTTP auth against the configured API and a file store in the data directory
    pub async fn from_config(config: &HarvestConfig) -> Result<Self, StorageError> {
        let storage = match &config.data_dir {
            Some(dir) => FileTokenStore::new(dir),
            None => FileTokenStore::from_env()?,
        };
        let auth = HttpAuthClient::new(&config.api_base_url);

        Ok(Self::open(config.auth_mode, Arc::new(auth), Arc::new(storage)).await)
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn session(&self) -> Session {
        self.session.read().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.session.read().user.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.session.read().token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.read().is_authenticated()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let request = LoginRequest::new(email, password);

        match self.auth.login(&request).await {
            Ok(response) => {
                info!(user_id = %response.user.id, role = %response.user.role, "Logged in");
                self.establish(response.user, response.token).await
            }
            Err(e) if self.mode == AuthMode::Strict => {
                warn!(email = %email, error = %e, "Login failed");
                Err(e)
            }
            Err(e) => {
                warn!(email = %email, error = %e, "Login endpoint failed, using offline identity");
                self.establish(offline_identity(email), mock_token()).await
            }
        }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        let request = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
            role,
        };

        match self.auth.register(&request).await {
            Ok(response) => {
                info!(user_id = %response.user.id, role = %response.user.role, "Registered");
                self.establish(response.user, response.token).await
            }
            Err(e) if self.mode == AuthMode::Strict => {
                warn!(email = %email, error = %e, "Registration failed");
                Err(e)
            }
            Err(e) => {
                warn!(
                    email = %email,
                    error = %e,
                    "Register endpoint failed, using offline identity"
                );
                self.establish(registered_identity(email, name, role), mock_token())
                    .await
            }
        }
    }

    /// Drop the session locally and in durable storage
    ///
    /// Durable storage is cleared first. In strict mode a failed clear leaves
    /// the session as it was, so memory and disk never disagree. The backend
    /// is told best-effort; its failure never blocks logout.
    pub async fn logout(&self) -> Result<(), AuthError> {
        if let Err(e) = self.storage.clear().await {
            if self.mode == AuthMode::Strict {
                warn!(error = %e, "Failed to clear stored token, still logged in");
                return Err(e.into());
            }
            warn!(error = %e, "Failed to clear stored token");
        }

        let previous = std::mem::take(&mut *self.session.write());

        if let Some(token) = previous.token.as_deref() {
            if token.starts_with(MOCK_TOKEN_PREFIX) {
                debug!("Offline session, skipping logout notification");
            } else if let Err(e) = self.auth.logout(token).await {
                warn!(error = %e, "Logout notification failed");
            }
        }

        info!("Logged out");
        Ok(())
    }

    /// Trade the current token for a fresh one
    ///
    /// Returns `None` when there is nothing to refresh: no session, or an
    /// offline session the backend never issued. In demo mode a failed
    /// refresh keeps the current token.
    pub async fn refresh(&self) -> Result<Option<User>, AuthError> {
        let Some(token) = self.token() else {
            return Ok(None);
        };
        if token.starts_with(MOCK_TOKEN_PREFIX) {
            debug!("Offline session, nothing to refresh");
            return Ok(None);
        }

        match self.auth.refresh(&token).await {
            Ok(response) => {
                info!(user_id = %response.user.id, "Session refreshed");
                self.establish(response.user, response.token).await.map(Some)
            }
            Err(e) if self.mode == AuthMode::Strict => {
                warn!(error = %e, "Token refresh failed");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, keeping current token");
                Ok(None)
            }
        }
    }

    /// Merge `update` into the current user; `false` if nobody is logged in
    pub fn update_user(&self, update: UserUpdate) -> bool {
        let mut session = self.session.write();
        match session.user.as_mut() {
            Some(user) => {
                update.apply_to(user);
                true
            }
            None => false,
        }
    }

    async fn establish(&self, user: User, token: String) -> Result<User, AuthError> {
        if let Err(e) = self.storage.save(&token).await {
            if self.mode == AuthMode::Strict {
                return Err(e.into());
            }
            warn!(error = %e, "Failed to persist token, session is memory-only");
        }

        *self.session.write() = Session {
            user: Some(user.clone()),
            token: Some(token),
        };
        Ok(user)
    }
}

impl CredentialSource for SessionStore {
    fn credential(&self) -> Option<String> {
        self.token()
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("mode", &self.mode)
            .field("session", &*self.session.read())
            .finish()
    }
}


#[cfg(test)]
mod async_tests {
    use super::*;
    use crate::auth::AuthResponse;
    use crate::storage::{async_trait, MemoryTokenStore};
    use chrono::Utc;
    use parking_lot::Mutex;

    /// Endpoint that is never reachable
    struct Unreachable;

    #[async_trait]
    impl AuthClient for Unreachable {
        async fn login(&self, _: &LoginRequest) -> Result<AuthResponse, AuthError> {
            Err(AuthError::NetworkUnavailable("connection refused".to_string()))
        }

        async fn register(&self, _: &RegisterRequest) -> Result<AuthResponse, AuthError> {
            Err(AuthError::NetworkUnavailable("connection refused".to_string()))
        }

        async fn logout(&self, _: &str) -> Result<(), AuthError> {
            Err(AuthError::NetworkUnavailable("connection refused".to_string()))
        }

        async fn refresh(&self, _: &str) -> Result<AuthResponse, AuthError> {
            Err(AuthError::NetworkUnavailable("connection refused".to_string()))
        }
    }

    fn server_user(email: &str) -> User {
        User {
            id: "server-7".to_string(),
            email: email.to_string(),
            name: "Server User".to_string(),
            role: Role::Admin,
            avatar: None,
            created_at: Utc::now(),
        }
    }

    /// Endpoint that accepts `demo123` and records logouts
    #[derive(Default)]
    struct Accepting {
        logouts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AuthClient for Accepting {
        async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, AuthError> {
            if request.password != "demo123" {
                return Err(AuthError::InvalidCredentials);
            }
            Ok(AuthResponse {
                user: server_user(&request.email),
                token: "server-token".to_string(),
            })
        }

        async fn register(&self, _: &RegisterRequest) -> Result<AuthResponse, AuthError> {
            Err(AuthError::Rejected { status: 409 })
        }

        async fn logout(&self, token: &str) -> Result<(), AuthError> {
            self.logouts.lock().push(token.to_string());
            Ok(())
        }

        async fn refresh(&self, token: &str) -> Result<AuthResponse, AuthError> {
            if token != "server-token" {
                return Err(AuthError::InvalidCredentials);
            }
            Ok(AuthResponse {
                user: server_user("farmer@demo.com"),
                token: "server-token-2".to_string(),
            })
        }
    }

    /// Storage whose writes always fail
    struct BrokenStorage;

    #[async_trait]
    impl TokenStore for BrokenStorage {
        async fn load(&self) -> Result<Option<String>, StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk gone")))
        }

        async fn save(&self, _: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk gone")))
        }

        async fn clear(&self) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk gone")))
        }
    }

    /// Storage holding a token that cannot be removed
    struct StuckToken {
        token: String,
    }

    #[async_trait]
    impl TokenStore for StuckToken {
        async fn load(&self) -> Result<Option<String>, StorageError> {
            Ok(Some(self.token.clone()))
        }

        async fn save(&self, _: &str) -> Result<(), StorageError> {
            Ok(())
        }

        async fn clear(&self) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("read-only filesystem")))
        }
    }

    async fn store_with(
        mode: AuthMode,
        auth: Arc<dyn AuthClient>,
    ) -> (SessionStore, Arc<MemoryTokenStore>) {
        let storage = Arc::new(MemoryTokenStore::new());
        let store = SessionStore::open(mode, auth, storage.clone()).await;
        (store, storage)
    }

    #[tokio::test]
    async fn test_demo_login_falls_back_to_preset() {
        let (store, storage) = store_with(AuthMode::Demo, Arc::new(Unreachable)).await;
        assert!(!store.is_authenticated());

        let user = store.login("admin@demo.com", "anything").await.unwrap();
        assert_eq!(user.id, "admin-1");
        assert_eq!(user.name, "John Administrator");
        assert_eq!(user.role, Role::Admin);

        assert!(store.is_authenticated());
        let token = store.token().unwrap();
        assert!(token.starts_with(MOCK_TOKEN_PREFIX));
        assert_eq!(storage.current(), Some(token));
        assert_eq!(store.user(), Some(user));
    }

    #[tokio::test]
    async fn test_demo_login_unknown_address() {
        let (store, _) = store_with(AuthMode::Demo, Arc::new(Unreachable)).await;

        let user = store.login("grower@farm.io", "pw").await.unwrap();
        assert_eq!(user.name, "Grower");
        assert_eq!(user.role, Role::Farmer);
        assert!(user.id.parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_strict_login_propagates_error() {
        let (store, storage) = store_with(AuthMode::Strict, Arc::new(Unreachable)).await;

        let result = store.login("admin@demo.com", "demo123").await;
        assert!(matches!(result, Err(AuthError::NetworkUnavailable(_))));
        assert!(!store.is_authenticated());
        assert_eq!(storage.current(), None);
    }

    #[tokio::test]
    async fn test_strict_invalid_credentials() {
        let (store, _) = store_with(AuthMode::Strict, Arc::new(Accepting::default())).await;

        let result = store.login("farmer@demo.com", "wrong").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        assert_eq!(store.session(), Session::default());
    }

    #[tokio::test]
    async fn test_successful_login_uses_server_identity() {
        let (store, storage) = store_with(AuthMode::Strict, Arc::new(Accepting::default())).await;

        let user = store.login("farmer@demo.com", "demo123").await.unwrap();
        assert_eq!(user.id, "server-7");
        assert_eq!(store.token().as_deref(), Some("server-token"));
        assert_eq!(storage.current().as_deref(), Some("server-token"));
    }

    #[tokio::test]
    async fn test_demo_register_builds_from_fields() {
        let (store, _) = store_with(AuthMode::Demo, Arc::new(Accepting::default())).await;

        let user = store
            .register("pilot@farm.io", "pw", "Sky Pilot", Role::DroneOperator)
            .await
            .unwrap();
        assert_eq!(user.email, "pilot@farm.io");
        assert_eq!(user.name, "Sky Pilot");
        assert_eq!(user.role, Role::DroneOperator);
        assert!(store.is_authenticated());
    }

    #[tokio::test]
    async fn test_strict_register_rejected() {
        let (store, _) = store_with(AuthMode::Strict, Arc::new(Accepting::default())).await;

        let result = store
            .register("farmer@demo.com", "pw", "Mary", Role::Farmer)
            .await;
        assert!(matches!(result, Err(AuthError::Rejected { status: 409 })));
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let auth = Arc::new(Accepting::default());
        let (store, storage) = store_with(AuthMode::Strict, auth.clone()).await;
        store.login("farmer@demo.com", "demo123").await.unwrap();

        store.logout().await.unwrap();

        assert!(!store.is_authenticated());
        assert_eq!(store.user(), None);
        assert_eq!(storage.current(), None);
        assert_eq!(*auth.logouts.lock(), vec!["server-token".to_string()]);
    }

    #[tokio::test]
    async fn test_logout_ignores_backend_failure() {
        let (store, storage) = store_with(AuthMode::Demo, Arc::new(Unreachable)).await;
        store.login("farmer@demo.com", "x").await.unwrap();

        assert!(store.logout().await.is_ok());
        assert!(!store.is_authenticated());
        assert_eq!(storage.current(), None);
    }

    #[tokio::test]
    async fn test_restores_persisted_token() {
        let storage = Arc::new(MemoryTokenStore::with_token("mock-jwt-token-42"));
        let store = SessionStore::open(AuthMode::Demo, Arc::new(Unreachable), storage).await;

        assert!(store.is_authenticated());
        assert_eq!(store.user(), None);
        assert_eq!(store.credential().as_deref(), Some("mock-jwt-token-42"));
    }

    #[tokio::test]
    async fn test_update_user() {
        let (store, _) = store_with(AuthMode::Demo, Arc::new(Unreachable)).await;
        assert!(!store.update_user(UserUpdate::new().name("Nobody")));

        store.login("farmer@demo.com", "x").await.unwrap();
        assert!(store.update_user(UserUpdate::new().name("Mary F.").avatar("/m.png")));

        let user = store.user().unwrap();
        assert_eq!(user.name, "Mary F.");
        assert_eq!(user.avatar.as_deref(), Some("/m.png"));
        assert_eq!(user.email, "farmer@demo.com");
        assert_eq!(user.role, Role::Farmer);
    }

    #[tokio::test]
    async fn test_storage_failure_by_mode() {
        let demo =
            SessionStore::open(AuthMode::Demo, Arc::new(Unreachable), Arc::new(BrokenStorage))
                .await;
        assert!(!demo.is_authenticated());
        demo.login("farmer@demo.com", "x").await.unwrap();
        assert!(demo.is_authenticated());

        let strict = SessionStore::open(
            AuthMode::Strict,
            Arc::new(Accepting::default()),
            Arc::new(BrokenStorage),
        )
        .await;
        let result = strict.login("farmer@demo.com", "demo123").await;
        assert!(matches!(result, Err(AuthError::Storage(_))));
        assert!(!strict.is_authenticated());
    }

    #[tokio::test]
    async fn test_strict_logout_keeps_session_when_clear_fails() {
        let auth = Arc::new(Accepting::default());
        let storage = Arc::new(StuckToken {
            token: "dev-abc.def".to_string(),
        });
        let store = SessionStore::open(AuthMode::Strict, auth.clone(), storage.clone()).await;
        assert!(store.is_authenticated());

        let result = store.logout().await;
        assert!(matches!(result, Err(AuthError::Storage(_))));

        // Memory still agrees with what the next process will restore
        assert!(store.is_authenticated());
        assert_eq!(store.token().as_deref(), Some("dev-abc.def"));
        assert!(auth.logouts.lock().is_empty());

        let reopened = SessionStore::open(AuthMode::Strict, auth.clone(), storage).await;
        assert_eq!(reopened.is_authenticated(), store.is_authenticated());
    }

    #[tokio::test]
    async fn test_demo_logout_survives_clear_failure() {
        let auth = Arc::new(Accepting::default());
        let storage = Arc::new(StuckToken {
            token: "dev-abc.def".to_string(),
        });
        let store = SessionStore::open(AuthMode::Demo, auth.clone(), storage).await;

        store.logout().await.unwrap();
        assert!(!store.is_authenticated());
        assert_eq!(*auth.logouts.lock(), vec!["dev-abc.def".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_replaces_token() {
        let (store, storage) = store_with(AuthMode::Strict, Arc::new(Accepting::default())).await;
        assert_eq!(store.refresh().await.unwrap(), None);

        store.login("farmer@demo.com", "demo123").await.unwrap();
        let user = store.refresh().await.unwrap().unwrap();

        assert_eq!(user.id, "server-7");
        assert_eq!(store.token().as_deref(), Some("server-token-2"));
        assert_eq!(storage.current().as_deref(), Some("server-token-2"));
    }

    #[tokio::test]
    async fn test_refresh_failure_by_mode() {
        let storage = Arc::new(MemoryTokenStore::with_token("dev-stale.token"));
        let strict = SessionStore::open(AuthMode::Strict, Arc::new(Unreachable), storage).await;
        let result = strict.refresh().await;
        assert!(matches!(result, Err(AuthError::NetworkUnavailable(_))));
        assert_eq!(strict.token().as_deref(), Some("dev-stale.token"));

        let storage = Arc::new(MemoryTokenStore::with_token("dev-stale.token"));
        let demo = SessionStore::open(AuthMode::Demo, Arc::new(Unreachable), storage).await;
        assert_eq!(demo.refresh().await.unwrap(), None);
        assert_eq!(demo.token().as_deref(), Some("dev-stale.token"));
    }

    #[tokio::test]
    async fn test_offline_session_skips_refresh() {
        let (store, _) = store_with(AuthMode::Strict, Arc::new(Unreachable)).await;
        let storage = Arc::new(MemoryTokenStore::with_token("mock-jwt-token-42"));
        let offline = SessionStore::open(AuthMode::Strict, Arc::new(Unreachable), storage).await;

        assert_eq!(store.refresh().await.unwrap(), None);
        assert_eq!(offline.refresh().await.unwrap(), None);
        assert_eq!(offline.token().as_deref(), Some("mock-jwt-token-42"));
    }
}
