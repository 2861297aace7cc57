//! Token persistence across two channels.
//!
//! This module provides:
//! - `TokenStore`: Reads, writes and clears the token in both channels
//! - `DurableStore`: Persistent key/value storage (file, keychain, memory)
//! - `HttpChannel`: The cookie copy that edge logic can read
//!
//! The durable copy lives under `jwt_token`; the cookie copy is named
//! `token` and expires with the token's `exp` claim (7 days without one).

pub mod cookie;
pub mod durable;
pub mod keychain;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, error, warn};

use crate::token;

pub use cookie::{cookie_value, set_cookie_header, HttpChannel, JarChannel, MemoryChannel, COOKIE_NAME};
pub use durable::{DurableStore, FileStore, MemoryStore};
pub use keychain::KeyringStore;

/// Durable store key for the token
pub const DURABLE_KEY: &str = "jwt_token";

#[derive(Clone)]
struct Channels {
    durable: Arc<dyn DurableStore>,
    http: Arc<dyn HttpChannel>,
}

/// Both copies of the session token.
///
/// A detached store (no channels, e.g. while rendering on the server) reads
/// as empty and ignores writes.
#[derive(Clone)]
pub struct TokenStore {
    channels: Option<Channels>,
    default_max_age: i64,
}

impl TokenStore {
    pub fn new(durable: Arc<dyn DurableStore>, http: Arc<dyn HttpChannel>) -> Self {
        Self {
            channels: Some(Channels { durable, http }),
            default_max_age: token::DEFAULT_COOKIE_MAX_AGE_SECS,
        }
    }

    pub fn detached() -> Self {
        Self {
            channels: None,
            default_max_age: token::DEFAULT_COOKIE_MAX_AGE_SECS,
        }
    }

    /// Cookie lifetime for tokens without an `exp` claim
    pub fn with_default_max_age(mut self, secs: i64) -> Self {
        self.default_max_age = secs;
        self
    }

    pub fn is_attached(&self) -> bool {
        self.channels.is_some()
    }

    /// The token, from the durable store first, then the cookie.
    pub fn get(&self) -> Option<String> {
        let channels = self.channels.as_ref()?;

        match channels.durable.get(DURABLE_KEY) {
            Ok(Some(token)) => return Some(token),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read durable token"),
        }

        channels.http.read()
    }

    /// The cookie copy only, as edge logic sees it.
    pub fn http_token(&self) -> Option<String> {
        self.channels.as_ref()?.http.read()
    }

    /// Write the token to both channels.
    ///
    /// If the cookie write fails, the durable entry is put back the way it
    /// was so the channels don't disagree.
    pub fn set(&self, token: &str) -> Result<()> {
        let Some(channels) = self.channels.as_ref() else {
            debug!("Token store detached, ignoring set");
            return Ok(());
        };

        let previous = channels.durable.get(DURABLE_KEY).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read durable token before write");
            None
        });

        channels
            .durable
            .set(DURABLE_KEY, token)
            .context("Failed to write token to durable store")?;

        let max_age = token::cookie_max_age_at(token, Utc::now().timestamp(), self.default_max_age);
        if let Err(e) = channels.http.write(token, max_age) {
            warn!(error = %e, "Cookie write failed, restoring durable token");
            let restored = match previous {
                Some(ref old) => channels.durable.set(DURABLE_KEY, old),
                None => channels.durable.remove(DURABLE_KEY),
            };
            if let Err(restore_err) = restored {
                error!(error = %restore_err, "Failed to restore durable token");
            }
            return Err(e.context("Failed to write token cookie"));
        }

        debug!(max_age, "Token stored");
        Ok(())
    }

    /// Rewrite the cookie copy from the durable copy, leaving the durable
    /// store untouched. Returns whether a token was found.
    pub fn restore_http_channel(&self) -> Result<bool> {
        let Some(channels) = self.channels.as_ref() else {
            return Ok(false);
        };
        let Some(token) = channels
            .durable
            .get(DURABLE_KEY)
            .context("Failed to read durable token")?
        else {
            return Ok(false);
        };

        let max_age = token::cookie_max_age_at(&token, Utc::now().timestamp(), self.default_max_age);
        channels
            .http
            .write(&token, max_age)
            .context("Failed to write token cookie")?;
        debug!(max_age, "Token cookie restored");
        Ok(true)
    }

    /// Remove the token from both channels. Both are attempted even if the
    /// first fails; the first error is returned.
    pub fn clear(&self) -> Result<()> {
        let Some(channels) = self.channels.as_ref() else {
            debug!("Token store detached, ignoring clear");
            return Ok(());
        };

        let durable = channels
            .durable
            .remove(DURABLE_KEY)
            .context("Failed to remove durable token");
        let http = channels
            .http
            .write("", 0)
            .context("Failed to expire token cookie");

        debug!("Token cleared");
        durable.and(http)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::test_token;
    use serde_json::json;

    struct FailingChannel;

    impl HttpChannel for FailingChannel {
        fn read(&self) -> Option<String> {
            None
        }

        fn write(&self, _value: &str, _max_age: i64) -> Result<()> {
            Err(anyhow::anyhow!("cookie channel unavailable"))
        }
    }

    /// Records every write so max-age values can be checked.
    #[derive(Default)]
    struct RecordingChannel {
        writes: parking_lot::Mutex<Vec<(String, i64)>>,
    }

    impl HttpChannel for RecordingChannel {
        fn read(&self) -> Option<String> {
            self.writes
                .lock()
                .last()
                .filter(|(_, max_age)| *max_age > 0)
                .map(|(value, _)| value.clone())
        }

        fn write(&self, value: &str, max_age: i64) -> Result<()> {
            self.writes.lock().push((value.to_string(), max_age));
            Ok(())
        }
    }

    fn memory_store() -> (TokenStore, Arc<MemoryStore>, Arc<MemoryChannel>) {
        let durable = Arc::new(MemoryStore::new());
        let http = Arc::new(MemoryChannel::new());
        (TokenStore::new(durable.clone(), http.clone()), durable, http)
    }

    #[test]
    fn test_set_then_get() {
        let (store, durable, http) = memory_store();
        let token = test_token(&json!({"email": "a@b.com"}));

        store.set(&token).unwrap();
        assert_eq!(store.get().as_deref(), Some(token.as_str()));
        assert_eq!(durable.get(DURABLE_KEY).unwrap().as_deref(), Some(token.as_str()));
        assert_eq!(http.read().as_deref(), Some(token.as_str()));
    }

    #[test]
    fn test_clear_then_get() {
        let (store, _, _) = memory_store();
        store.set(&test_token(&json!({}))).unwrap();

        store.clear().unwrap();
        assert_eq!(store.get(), None);
        assert_eq!(store.http_token(), None);
    }

    #[test]
    fn test_get_falls_back_to_cookie() {
        let (store, _, http) = memory_store();
        http.write("from.the.cookie", 60).unwrap();
        assert_eq!(store.get().as_deref(), Some("from.the.cookie"));
    }

    #[test]
    fn test_get_prefers_durable() {
        let (store, durable, http) = memory_store();
        durable.set(DURABLE_KEY, "durable.copy.x").unwrap();
        http.write("cookie.copy.y", 60).unwrap();
        assert_eq!(store.get().as_deref(), Some("durable.copy.x"));
    }

    #[test]
    fn test_cookie_max_age_follows_exp() {
        let durable = Arc::new(MemoryStore::new());
        let http = Arc::new(RecordingChannel::default());
        let store = TokenStore::new(durable, http.clone());

        let exp = Utc::now().timestamp() + 3600;
        store.set(&test_token(&json!({"exp": exp}))).unwrap();
        store.set(&test_token(&json!({"exp": 1}))).unwrap();
        store.set(&test_token(&json!({"name": "A"}))).unwrap();
        store.clear().unwrap();

        let writes = http.writes.lock();
        let ages: Vec<i64> = writes.iter().map(|(_, age)| *age).collect();
        // First write can lose a second to the clock between set and assert
        assert!((3599..=3600).contains(&ages[0]));
        assert_eq!(&ages[1..], &[0, 604_800, 0]);
        assert_eq!(writes[3].0, "");
    }

    #[test]
    fn test_custom_default_max_age() {
        let http = Arc::new(RecordingChannel::default());
        let store = TokenStore::new(Arc::new(MemoryStore::new()), http.clone())
            .with_default_max_age(120);
        store.set(&test_token(&json!({}))).unwrap();
        assert_eq!(http.writes.lock()[0].1, 120);
    }

    #[test]
    fn test_failed_cookie_write_rolls_back() {
        let durable = Arc::new(MemoryStore::new());
        let store = TokenStore::new(durable.clone(), Arc::new(FailingChannel));

        assert!(store.set("first.token.x").is_err());
        assert_eq!(durable.get(DURABLE_KEY).unwrap(), None);

        durable.set(DURABLE_KEY, "old.token.x").unwrap();
        assert!(store.set("new.token.y").is_err());
        assert_eq!(durable.get(DURABLE_KEY).unwrap().as_deref(), Some("old.token.x"));
    }

    #[test]
    fn test_clear_attempts_both_channels() {
        let durable = Arc::new(MemoryStore::new());
        durable.set(DURABLE_KEY, "a.b.c").unwrap();
        let store = TokenStore::new(durable.clone(), Arc::new(FailingChannel));

        assert!(store.clear().is_err());
        assert_eq!(durable.get(DURABLE_KEY).unwrap(), None);
    }

    /// Durable store that can be read but never written.
    struct ReadOnlyStore(Option<String>);

    impl DurableStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(self.0.clone())
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow::anyhow!("read-only"))
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(anyhow::anyhow!("read-only"))
        }
    }

    #[test]
    fn test_restore_http_channel_only_writes_cookie() {
        let token = test_token(&json!({"name": "A"}));
        let http = Arc::new(RecordingChannel::default());
        let store = TokenStore::new(Arc::new(ReadOnlyStore(Some(token.clone()))), http.clone());

        assert!(store.restore_http_channel().unwrap());
        assert_eq!(store.http_token().as_deref(), Some(token.as_str()));
        assert_eq!(http.writes.lock()[0].1, 604_800);

        let empty = TokenStore::new(Arc::new(ReadOnlyStore(None)), Arc::new(MemoryChannel::new()));
        assert!(!empty.restore_http_channel().unwrap());
        assert!(!TokenStore::detached().restore_http_channel().unwrap());
    }

    #[test]
    fn test_detached_store_is_noop() {
        let store = TokenStore::detached();
        assert!(!store.is_attached());
        assert!(store.set("a.b.c").is_ok());
        assert_eq!(store.get(), None);
        assert!(store.clear().is_ok());
        assert_eq!(store.http_token(), None);
    }
}
