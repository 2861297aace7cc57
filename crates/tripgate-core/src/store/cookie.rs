use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;

/// Cookie carrying the token to edge/server logic
pub const COOKIE_NAME: &str = "token";

/// Render the `Set-Cookie` value for the token channel.
/// A `max_age` of 0 deletes the cookie.
pub fn set_cookie_header(value: &str, max_age: i64) -> String {
    format!("{}={}; Path=/; Max-Age={}", COOKIE_NAME, value, max_age.max(0))
}

/// Find a cookie's value in a `Cookie` request header (`a=1; b=2`).
/// Empty values count as absent.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// Short-lived storage readable by HTTP-side logic.
pub trait HttpChannel: Send + Sync {
    /// Current token value, if present and not yet expired
    fn read(&self) -> Option<String>;

    /// Store `value` for `max_age` seconds; 0 removes it.
    fn write(&self, value: &str, max_age: i64) -> Result<()>;
}

/// Token cookie kept in a reqwest cookie jar scoped to the app origin.
///
/// A client built with this jar as its cookie provider sends the token on
/// every request to the origin, the same way a browser would.
pub struct JarChannel {
    jar: Arc<Jar>,
    origin: Url,
}

impl JarChannel {
    pub fn new(origin: Url) -> Self {
        Self::with_jar(Arc::new(Jar::default()), origin)
    }

    pub fn with_jar(jar: Arc<Jar>, origin: Url) -> Self {
        Self { jar, origin }
    }

    pub fn jar(&self) -> Arc<Jar> {
        self.jar.clone()
    }
}

impl HttpChannel for JarChannel {
    fn read(&self) -> Option<String> {
        let header = self.jar.cookies(&self.origin)?;
        let header = header.to_str().ok()?;
        cookie_value(header, COOKIE_NAME).map(str::to_string)
    }

    fn write(&self, value: &str, max_age: i64) -> Result<()> {
        self.jar
            .add_cookie_str(&set_cookie_header(value, max_age), &self.origin);
        Ok(())
    }
}

/// In-process cookie with max-age semantics.
#[derive(Default)]
pub struct MemoryChannel {
    cookie: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HttpChannel for MemoryChannel {
    fn read(&self) -> Option<String> {
        let cookie = self.cookie.lock();
        match cookie.as_ref() {
            Some((value, expires)) if Utc::now() < *expires && !value.is_empty() => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    fn write(&self, value: &str, max_age: i64) -> Result<()> {
        let mut cookie = self.cookie.lock();
        *cookie = if max_age > 0 {
            Some((value.to_string(), Utc::now() + Duration::seconds(max_age)))
        } else {
            None
        };
        Ok(())
    }
}
