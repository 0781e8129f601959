use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::http::ApiClient;
use crate::models::UserProfile;
use crate::storage::{CredentialStore, StoredSession};

/// Where the embedding shell should send the user next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavTarget {
    Home,
    Login { return_to: Option<String> },
}

/// Navigation capability injected by the embedding shell. The store never
/// decides how routing works, only when a redirect must happen.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: NavTarget);
}

/// Authentication state as the rest of the client sees it.
///
/// `authenticated` implies a present `user` once `loading` has cleared.
/// `error` holds the last login failure for inline display.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub authenticated: bool,
    pub user: Option<UserProfile>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Session {
    fn starting() -> Self {
        Self {
            authenticated: false,
            user: None,
            loading: true,
            error: None,
        }
    }

    fn signed_out() -> Self {
        Self {
            authenticated: false,
            user: None,
            loading: false,
            error: None,
        }
    }

    fn signed_in(user: UserProfile) -> Self {
        Self {
            authenticated: true,
            user: Some(user),
            loading: false,
            error: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.authenticated
            && self
                .user
                .as_ref()
                .map(|user| user.role.is_admin())
                .unwrap_or(false)
    }
}

/// Outcome of a login attempt. A rejected login is data, not an error, so
/// callers can render the message inline without unwinding.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Success { user: UserProfile },
    Rejected { message: String },
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success { .. })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    user_id: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    user: UserProfile,
}

#[derive(Deserialize)]
struct MeResponse {
    user: UserProfile,
}

/// Owns the session lifecycle: restore at startup, login, logout, and the
/// global 401 teardown. All state flows through a watch channel so any
/// number of observers can follow along.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: ApiClient,
    storage: CredentialStore,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<Session>,
}

impl SessionStore {
    pub fn new(config: Config, navigator: Arc<dyn Navigator>) -> Self {
        let client = ApiClient::new(config.clone());
        let storage = CredentialStore::new(&config.state_dir);
        let (state, _) = watch::channel(Session::starting());
        let inner = Arc::new(SessionInner {
            client,
            storage,
            navigator,
            state,
        });

        // The hook holds a Weak reference so the client (inside inner) never
        // keeps the store alive on its own.
        let weak: Weak<SessionInner> = Arc::downgrade(&inner);
        inner.client.set_unauthorized_hook(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.expire();
            }
        }));

        Self { inner }
    }

    /// The API client every other surface should share. It carries the
    /// bearer token this store manages.
    pub fn client(&self) -> ApiClient {
        self.inner.client.clone()
    }

    pub fn snapshot(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Bring a persisted session back, validating the cached token against
    /// the backend before trusting it. Dependents hold on `loading` until
    /// this settles.
    ///
    /// Fails closed: no cache, an unreachable backend, or a rejected token
    /// all end unauthenticated with the cache cleared.
    pub async fn restore(&self) -> Session {
        let Some(cached) = self.inner.storage.load() else {
            self.inner.state.send_modify(|s| *s = Session::signed_out());
            return self.snapshot();
        };

        self.inner.client.set_token(Some(cached.token.clone()));
        match self.inner.client.get_json::<MeResponse>("/auth/me").await {
            Ok(me) if !me.user.id.trim().is_empty() => {
                let user = me.user.normalize_avatar(&self.inner.client.origin());
                let refreshed = StoredSession {
                    token: cached.token,
                    user: user.clone(),
                };
                if let Err(err) = self.inner.storage.save(&refreshed) {
                    warn!(?err, "failed to refresh session cache");
                }
                info!(user = %user.id, "session restored");
                self.inner.state.send_modify(|s| *s = Session::signed_in(user));
            }
            Ok(_) => {
                warn!("token validation returned a user without an id, signing out");
                self.inner.sign_out_quietly();
            }
            Err(err) => {
                // A 401 already tore everything down through the hook; any
                // other failure still means the token cannot be trusted.
                warn!(error = %err, "session restore failed, signing out");
                self.inner.sign_out_quietly();
            }
        }
        self.snapshot()
    }

    /// Exchange credentials for a token. On success the session is persisted
    /// and the shell is pointed home; on rejection only `error` changes.
    pub async fn login(&self, user_id: &str, password: &str) -> LoginOutcome {
        let payload = LoginRequest {
            user_id: user_id.trim(),
            password,
        };
        match self
            .inner
            .client
            .post_json_preauth::<LoginResponse, _>("/auth/login", &payload)
            .await
        {
            Ok(response) if !response.user.id.trim().is_empty() => {
                let user = response.user.normalize_avatar(&self.inner.client.origin());
                self.inner.client.set_token(Some(response.token.clone()));
                let stored = StoredSession {
                    token: response.token,
                    user: user.clone(),
                };
                if let Err(err) = self.inner.storage.save(&stored) {
                    warn!(?err, "failed to persist session");
                }
                self.inner.state.send_modify(|s| *s = Session::signed_in(user.clone()));
                info!(user = %user.id, "signed in");
                self.inner.navigator.navigate(NavTarget::Home);
                LoginOutcome::Success { user }
            }
            Ok(_) => {
                warn!("login response carried a user without an id");
                let message = "The server returned an incomplete account profile.".to_string();
                self.inner
                    .state
                    .send_modify(|s| s.error = Some(message.clone()));
                LoginOutcome::Rejected { message }
            }
            Err(err) => {
                let message = err.message().to_string();
                self.inner
                    .state
                    .send_modify(|s| s.error = Some(message.clone()));
                LoginOutcome::Rejected { message }
            }
        }
    }

    /// Drop the session locally. No backend call; the token simply stops
    /// being used.
    pub fn logout(&self) {
        self.inner.storage.clear();
        self.inner.client.set_token(None);
        self.inner.state.send_modify(|s| *s = Session::signed_out());
        info!("signed out");
        self.inner.navigator.navigate(NavTarget::Login { return_to: None });
    }

    /// Dismiss the last login error without touching anything else.
    pub fn clear_error(&self) {
        self.inner.state.send_modify(|s| s.error = None);
    }
}

impl SessionInner {
    /// Global 401 teardown: wipe credentials and send the shell to login.
    ///
    /// Rejected logins never get here: the credential exchange keeps the
    /// 401 listener disarmed. Skipped when nothing is signed in or
    /// restoring, so a burst of parallel 401s cannot stack redirects.
    fn expire(&self) {
        let active = {
            let session = self.state.borrow();
            session.authenticated || session.loading
        };
        if !active {
            return;
        }
        self.storage.clear();
        self.client.set_token(None);
        self.state.send_modify(|s| *s = Session::signed_out());
        warn!("session expired, forcing sign-out");
        self.navigator.navigate(NavTarget::Login { return_to: None });
    }

    fn sign_out_quietly(&self) {
        self.storage.clear();
        self.client.set_token(None);
        self.state.send_modify(|s| *s = Session::signed_out());
    }
}
