//! Per-request access decision at the edge.
//!
//! Runs before any protected content is produced. It only checks that the
//! `token` cookie is present: an expired or unreadable token still passes,
//! and the session layer treats it as signed out afterwards.

use reqwest::header::{HeaderMap, COOKIE};
use tracing::debug;

use crate::store::{cookie_value, COOKIE_NAME};

/// What to do with an incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Paths under these prefixes need a token
    pub protected_prefixes: Vec<String>,
    /// Public landing page
    pub landing_path: String,
    /// Where signed-in visitors of the landing page go
    pub protected_home: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            protected_prefixes: vec!["/dashboard".to_string()],
            landing_path: "/".to_string(),
            protected_home: "/dashboard".to_string(),
        }
    }
}

/// `prefix` itself or anything below it, on segment boundaries.
fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Read the token cookie from a `Cookie` header value.
pub fn token_from_cookie_header(header: &str) -> Option<&str> {
    cookie_value(header, COOKIE_NAME)
}

#[derive(Debug, Clone, Default)]
pub struct AccessGuard {
    config: GuardConfig,
}

impl AccessGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.config
            .protected_prefixes
            .iter()
            .any(|prefix| under_prefix(path, prefix))
    }

    /// Paths the guard runs on: the landing page and protected areas.
    pub fn matches(&self, path: &str) -> bool {
        path == self.config.landing_path || self.is_protected(path)
    }

    pub fn evaluate(&self, path: &str, token: Option<&str>) -> Decision {
        let has_token = token.is_some_and(|t| !t.is_empty());

        let decision = if !self.matches(path) {
            Decision::Allow
        } else if self.is_protected(path) && !has_token {
            Decision::Redirect(self.config.landing_path.clone())
        } else if path == self.config.landing_path && has_token {
            Decision::Redirect(self.config.protected_home.clone())
        } else {
            Decision::Allow
        };

        debug!(path, has_token, ?decision, "Access decision");
        decision
    }

    /// Evaluate using the token cookie found in the request's `Cookie` headers.
    pub fn evaluate_headers(&self, path: &str, headers: &HeaderMap) -> Decision {
        let token = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(token_from_cookie_header);
        self.evaluate(path, token)
    }
}
