use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::{AuthError, Navigator};
use crate::api::{Endpoint, Issuer};
use crate::store::TokenStore;
use crate::token::{self, Claims, User};

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";

/// Where session transitions send the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Public landing page, target of logout
    pub landing_path: String,
    /// Default protected page, target of login/register
    pub protected_home: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            landing_path: "/".to_string(),
            protected_home: "/dashboard".to_string(),
        }
    }
}

/// Snapshot of the session as the UI sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Session {
    pub user: Option<User>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Registration form sent to the issuing service.
#[derive(Clone, Serialize)]
pub struct RegisterPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    pub password: String,
}

struct Inner {
    session: Session,
    /// Bumped by every login/register/logout; results from older calls are dropped
    epoch: u64,
}

/// Session state for one application instance.
///
/// The signed-in user is never stored separately: it is derived from the
/// token in the `TokenStore` whenever the token changes.
pub struct SessionState {
    issuer: Arc<dyn Issuer>,
    store: TokenStore,
    navigator: Arc<dyn Navigator>,
    config: SessionConfig,
    inner: Mutex<Inner>,
    /// Serializes token writes and clears; never held with `inner` across I/O
    transitions: Mutex<()>,
}

impl SessionState {
    pub fn new(
        issuer: Arc<dyn Issuer>,
        store: TokenStore,
        navigator: Arc<dyn Navigator>,
        config: SessionConfig,
    ) -> Self {
        Self {
            issuer,
            store,
            navigator,
            config,
            inner: Mutex::new(Inner {
                session: Session {
                    user: None,
                    loading: true,
                    error: None,
                },
                epoch: 0,
            }),
            transitions: Mutex::new(()),
        }
    }

    /// Derive the user from whatever token is already stored.
    pub fn init(&self) {
        let user = self.current_user();
        debug!(authenticated = user.is_some(), "Session initialized");
        let mut inner = self.inner.lock();
        inner.session.user = user;
        inner.session.loading = false;
    }

    pub fn snapshot(&self) -> Session {
        self.inner.lock().session.clone()
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Claims of the stored token, `Ok(None)` when there is no token.
    pub fn claims(&self) -> Result<Option<Claims>, AuthError> {
        match self.store.get() {
            Some(token) => Ok(Some(token::decode(&token)?)),
            None => Ok(None),
        }
    }

    /// A token is stored and it is not expired.
    ///
    /// Only the `exp` claim is consulted, so a token without readable
    /// claims counts as authenticated here while `current_user` is `None`.
    pub fn is_authenticated(&self) -> bool {
        self.store
            .get()
            .is_some_and(|token| !token::is_expired(&token))
    }

    /// Identity from a readable, unexpired token.
    pub fn current_user(&self) -> Option<User> {
        match self.claims() {
            Ok(claims) => claims.filter(is_live).map(|claims| claims.user()),
            Err(e) => {
                debug!(error = %e, "Stored token has no readable claims");
                None
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> bool {
        let body = json!({ "email": email, "password": password });
        self.exchange(Endpoint::Login, body, LOGIN_FAILED).await
    }

    pub async fn register(&self, payload: RegisterPayload) -> bool {
        let body = match serde_json::to_value(&payload) {
            Ok(body) => body,
            Err(e) => {
                self.inner.lock().session.error = Some(e.to_string());
                return false;
            }
        };
        self.exchange(Endpoint::Register, body, REGISTRATION_FAILED).await
    }

    /// Forget the token and go back to the landing page.
    pub fn logout(&self) {
        {
            let _transition = self.transitions.lock();
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to clear token");
            }
            let mut inner = self.inner.lock();
            inner.epoch += 1;
            inner.session.user = None;
            inner.session.loading = false;
        }
        info!("Logged out");
        self.navigator.push(&self.config.landing_path);
    }

    async fn exchange(&self, endpoint: Endpoint, body: Value, fallback: &str) -> bool {
        let epoch = {
            let mut inner = self.inner.lock();
            inner.epoch += 1;
            inner.session.loading = true;
            inner.session.error = None;
            inner.epoch
        };

        let outcome = self.request_token(endpoint, body, fallback).await;

        {
            let _transition = self.transitions.lock();
            let latest = self.inner.lock().epoch;
            if latest != epoch {
                debug!(?endpoint, epoch, latest, "Discarding superseded result");
                return false;
            }

            // Store I/O happens without the state lock so snapshots stay responsive
            let stored = outcome.and_then(|token| {
                self.store
                    .set(&token)
                    .map_err(|e| AuthError::Storage(e.to_string()))
                    .map(|()| token)
            });

            // A newer call may have started during the write; it owns loading/error
            let mut inner = self.inner.lock();
            let current = inner.epoch == epoch;
            if current {
                inner.session.loading = false;
            }

            match stored {
                Ok(token) => {
                    inner.session.user = user_from_token(&token);
                    info!(?endpoint, "Session established");
                }
                Err(e) => {
                    error!(?endpoint, error = %e, "Credential exchange failed");
                    if current {
                        inner.session.error = Some(e.to_string());
                    }
                    return false;
                }
            }
        }

        self.navigator.push(&self.config.protected_home);
        true
    }

    async fn request_token(&self, endpoint: Endpoint, body: Value, fallback: &str) -> Result<String, AuthError> {
        let reply = self
            .issuer
            .exchange(endpoint, body)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !reply.is_success() {
            let message = reply.message().unwrap_or(fallback);
            return Err(AuthError::IssuingService(message.to_string()));
        }

        reply
            .token()
            .map(str::to_string)
            .ok_or(AuthError::MissingTokenInResponse)
    }
}

fn is_live(claims: &Claims) -> bool {
    claims
        .exp
        .map_or(true, |exp| (Utc::now().timestamp() as f64) < exp)
}

fn user_from_token(token: &str) -> Option<User> {
    token::decode(token)
        .ok()
        .filter(is_live)
        .map(|claims| claims.user())
}
