//! Session state machine and credential lifecycle
//!
//! The authenticated session is an explicit value shared through a
//! [`SessionHandle`]: the manager mutates it, the HTTP client and the
//! conversation engine read through the handle on every use so an
//! asynchronous invalidation is observed immediately rather than through a
//! stale cached copy.

use std::sync::{Arc, RwLock};

use crate::client::ApiClient;
use crate::credentials::{CredentialStore, KEY_TOKEN, KEY_USERNAME, KEY_USER_ID};
use crate::error::{ConfabError, Result};

/// Minimal identity of the authenticated user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Server-side user id
    pub id: String,
    /// Display/user name, sent along with every conversation turn
    pub username: String,
    /// Email address; empty until the first profile fetch after a restore
    pub email: String,
}

/// Authentication state: a bearer token plus the user it belongs to
///
/// The session is authenticated exactly when both the token and the user
/// are present; the two are always set and cleared together.
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Option<String>,
    user: Option<User>,
}

impl Session {
    /// The current bearer token, if any
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// The current user identity, if any
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Whether both a token and a user identity are present
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Shared, read-through access to the one process-wide [`Session`]
///
/// Cloning the handle is cheap; all clones observe the same state. Mutation
/// goes through [`SessionManager`] except for [`SessionHandle::invalidate`],
/// which the HTTP client calls when the server rejects the credential.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<RwLock<Session>>,
    store: Arc<dyn CredentialStore>,
}

impl SessionHandle {
    /// Create a handle over an empty (unauthenticated) session
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Session::default())),
            store,
        }
    }

    /// Rebuild the session from persisted credentials at startup
    ///
    /// Returns `true` when a stored token and identity were found. The email
    /// field is not persisted and stays empty until the next profile fetch.
    pub async fn restore(&self) -> Result<bool> {
        let token = self.store.get(KEY_TOKEN).await?;
        let user_id = self.store.get(KEY_USER_ID).await?;
        let username = self.store.get(KEY_USERNAME).await?;

        match (token, user_id, username) {
            (Some(token), Some(id), Some(username)) => {
                self.establish(
                    token,
                    User {
                        id,
                        username: username.clone(),
                        email: String::new(),
                    },
                )?;
                tracing::info!(username = %username, "Restored session from credential store");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Read the current token (read-through, never cached by callers)
    pub fn token(&self) -> Option<String> {
        self.inner
            .read()
            .ok()
            .and_then(|session| session.token.clone())
    }

    /// Read the current user identity
    pub fn user(&self) -> Option<User> {
        self.inner
            .read()
            .ok()
            .and_then(|session| session.user.clone())
    }

    /// Whether the session currently holds a token and a user
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .read()
            .map(|session| session.is_authenticated())
            .unwrap_or(false)
    }

    /// Clear the session and remove the persisted credential fields
    ///
    /// This is the central invalidation path: it transitions the session to
    /// unauthenticated at most once, no matter how many concurrent failures
    /// observe the same rejected credential. Returns `true` only for the
    /// call that performed the transition. Store removal failures are logged
    /// and swallowed; the in-memory state is already cleared at that point.
    pub async fn invalidate(&self) -> bool {
        if !self.clear() {
            return false;
        }

        tracing::warn!("Session invalidated: clearing persisted credentials");
        if let Err(e) = self
            .store
            .remove_many(&[KEY_TOKEN, KEY_USER_ID, KEY_USERNAME])
            .await
        {
            tracing::error!("Failed to clear persisted credentials: {}", e);
        }
        true
    }

    /// Set token and user together (in-memory only)
    pub(crate) fn establish(&self, token: String, user: User) -> Result<()> {
        let mut session = self
            .inner
            .write()
            .map_err(|_| ConfabError::Storage("Session lock poisoned".into()))?;
        session.token = Some(token);
        session.user = Some(user);
        Ok(())
    }

    /// Replace the user identity, keeping the token
    ///
    /// Ignored when no token is present: a profile that arrives after an
    /// invalidation must not resurrect a half-authenticated session.
    pub(crate) fn update_user(&self, user: User) -> Result<()> {
        let mut session = self
            .inner
            .write()
            .map_err(|_| ConfabError::Storage("Session lock poisoned".into()))?;
        if session.token.is_some() {
            session.user = Some(user);
        }
        Ok(())
    }

    /// Clear token and user; returns whether anything was cleared
    pub(crate) fn clear(&self) -> bool {
        match self.inner.write() {
            Ok(mut session) => {
                let had_credential = session.token.is_some() || session.user.is_some();
                session.token = None;
                session.user = None;
                had_credential
            }
            Err(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Owner of all session state transitions
///
/// States: unauthenticated, authenticating (a login call in flight), and
/// authenticated. Every transition is persisted through the credential
/// store so that a restart lands back in the same state.
pub struct SessionManager {
    api: Arc<ApiClient>,
    session: SessionHandle,
    store: Arc<dyn CredentialStore>,
}

impl SessionManager {
    /// Create a manager over the shared session handle
    pub fn new(api: Arc<ApiClient>, session: SessionHandle, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            api,
            session,
            store,
        }
    }

    /// The shared session handle
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Restore the session from persisted credentials
    pub async fn restore(&self) -> Result<bool> {
        self.session.restore().await
    }

    /// Authenticate with email and password
    ///
    /// On success the token and identity are persisted, the session becomes
    /// authenticated, and a profile fetch fills in the full user record. A
    /// rejected password surfaces as [`ConfabError::InvalidCredentials`];
    /// nothing is persisted on any failure path of the login call itself.
    ///
    /// A profile-refresh failure after a successful login does not undo the
    /// login: it is logged and the identity from the login response is
    /// returned, unless the refresh came back 401 (in which case the session
    /// has already been invalidated and the error propagates).
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let response = match self.api.login(email, password).await {
            Ok(response) => response,
            Err(e) => {
                return Err(match e.downcast_ref::<ConfabError>() {
                    Some(ConfabError::Server { status: 401, .. }) => {
                        ConfabError::InvalidCredentials.into()
                    }
                    _ => e,
                });
            }
        };

        self.store.set(KEY_TOKEN, &response.access_token).await?;
        self.store.set(KEY_USER_ID, &response.user_id).await?;
        self.store.set(KEY_USERNAME, &response.username).await?;

        let user = User {
            id: response.user_id,
            username: response.username,
            email: email.to_string(),
        };
        self.session
            .establish(response.access_token, user.clone())?;
        tracing::info!(username = %user.username, "Login succeeded");

        match self.fetch_profile().await {
            Ok(full) => Ok(full),
            Err(e) if matches!(e.downcast_ref::<ConfabError>(), Some(ConfabError::Unauthorized)) => {
                Err(e)
            }
            Err(e) => {
                tracing::warn!("Profile refresh after login failed: {}", e);
                Ok(user)
            }
        }
    }

    /// Create a new account
    ///
    /// Registration does not authenticate; call [`SessionManager::login`]
    /// afterwards. A taken username/email surfaces as a server error with
    /// the service's message.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<()> {
        self.api.register(username, email, password).await?;
        tracing::info!(username = %username, "Account registered");
        Ok(())
    }

    /// End the session, clearing in-memory and persisted credentials
    ///
    /// The service exposes no remote session-invalidation endpoint, so
    /// logout is entirely local and cannot fail against the network. The
    /// active conversation id is intentionally left in the store.
    pub async fn logout(&self) -> Result<()> {
        let was_authenticated = self.session.clear();
        self.store
            .remove_many(&[KEY_TOKEN, KEY_USER_ID, KEY_USERNAME])
            .await?;
        if was_authenticated {
            tracing::info!("Logged out");
        }
        Ok(())
    }

    /// Fetch the full user profile and refresh the session's identity
    ///
    /// Fails fast with [`ConfabError::AuthRequired`] when no token is held.
    /// A 401 response invalidates the session centrally and surfaces as
    /// [`ConfabError::Unauthorized`].
    pub async fn fetch_profile(&self) -> Result<User> {
        let profile = self.api.fetch_profile().await?;
        let user = User {
            id: profile.id,
            username: profile.username,
            email: profile.email,
        };
        self.session.update_user(user.clone())?;
        Ok(user)
    }

    /// Delete the account on the server, then log out locally
    ///
    /// On failure the session is left untouched and the error is surfaced;
    /// local state is only cleared once the server confirms the deletion.
    pub async fn delete_account(&self) -> Result<()> {
        self.api.delete_account().await?;
        tracing::info!("Account deleted");
        self.logout().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
