use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Maximum accepted token length in bytes.
/// Issued tokens are a few hundred bytes; anything past a cookie's practical
/// size is not a token we issued.
const MAX_TOKEN_BYTES: usize = 8 * 1024;

/// Cookie lifetime used when the token carries no `exp` claim (7 days).
pub const DEFAULT_COOKIE_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;

/// Base64url that tolerates trailing `=` padding on input.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token: expected 3 segments, found {0}")]
    SegmentCount(usize),

    #[error("Malformed token: exceeds the 8 KiB size limit")]
    TooLarge,

    #[error("Malformed token: payload is not base64url ({0})")]
    Base64(String),

    #[error("Malformed token: payload is not UTF-8")]
    Utf8,

    #[error("Malformed token: payload is not a claims object ({0})")]
    Json(String),
}

/// Claims carried in the token payload. Unknown claims are ignored.
///
/// Claims are read leniently: `name` and `email` take strings as given and
/// other scalars as their JSON text, and `exp` is any JSON number (RFC 7519
/// NumericDate may be fractional). A claim of any other shape reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Claims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiration, seconds since the Unix epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<f64>,
}

/// Identity shown for the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub name: Option<String>,
    pub email: Option<String>,
}

fn text_claim(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl Claims {
    fn from_object(payload: &Map<String, Value>) -> Self {
        Self {
            name: text_claim(payload.get("name")),
            email: text_claim(payload.get("email")),
            exp: payload.get("exp").and_then(Value::as_f64),
        }
    }

    pub fn user(&self) -> User {
        User {
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Decode the claims of a three-segment token without verifying it.
pub fn decode(token: &str) -> Result<Claims, TokenError> {
    if token.len() > MAX_TOKEN_BYTES {
        return Err(TokenError::TooLarge);
    }

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenError::SegmentCount(segments.len()));
    }

    let bytes = PAYLOAD_ENGINE
        .decode(segments[1])
        .map_err(|e| TokenError::Base64(e.to_string()))?;
    let json = String::from_utf8(bytes).map_err(|_| TokenError::Utf8)?;

    let payload: Value = serde_json::from_str(&json).map_err(|e| TokenError::Json(e.to_string()))?;
    match payload {
        Value::Object(ref object) => Ok(Claims::from_object(object)),
        other => Err(TokenError::Json(format!("expected an object, found {}", other))),
    }
}

/// The `exp` claim, or None when absent or the token can't be decoded.
pub fn expiration_of(token: &str) -> Option<f64> {
    decode(token).ok().and_then(|claims| claims.exp)
}

pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now().timestamp())
}

/// True iff an `exp` claim exists and `now >= exp`.
pub fn is_expired_at(token: &str, now: i64) -> bool {
    match expiration_of(token) {
        Some(exp) => now as f64 >= exp,
        None => false,
    }
}

pub fn cookie_max_age(token: &str) -> i64 {
    cookie_max_age_at(token, Utc::now().timestamp(), DEFAULT_COOKIE_MAX_AGE_SECS)
}

/// Seconds the HTTP-visible copy should live: the time left until `exp`
/// (never negative), or `default` when the token has no expiry.
pub fn cookie_max_age_at(token: &str, now: i64, default: i64) -> i64 {
    match expiration_of(token) {
        // Whole seconds left; `as` saturates on out-of-range values
        Some(exp) => (exp - now as f64).max(0.0).floor() as i64,
        None => default,
    }
}

/// Build an unsigned token around the given claims JSON.
#[cfg(test)]
pub(crate) fn test_token(claims: &serde_json::Value) -> String {
    let header = PAYLOAD_ENGINE.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = PAYLOAD_ENGINE.encode(claims.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_750_000_000;

    #[test]
    fn test_decode_claims() {
        let token = test_token(&json!({"name": "A", "email": "a@b.com", "exp": NOW}));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.name.as_deref(), Some("A"));
        assert_eq!(claims.email.as_deref(), Some("a@b.com"));
        assert_eq!(claims.exp, Some(NOW as f64));
    }

    #[test]
    fn test_decode_fractional_exp() {
        let token = test_token(&json!({"email": "a@b.com", "exp": 1.5}));
        assert_eq!(decode(&token).unwrap().exp, Some(1.5));
        assert_eq!(expiration_of(&token), Some(1.5));
        assert!(is_expired_at(&token, NOW));
        assert_eq!(cookie_max_age_at(&token, NOW, DEFAULT_COOKIE_MAX_AGE_SECS), 0);

        let later = test_token(&json!({"exp": NOW as f64 + 3600.5}));
        assert!(!is_expired_at(&later, NOW));
        assert_eq!(cookie_max_age_at(&later, NOW, DEFAULT_COOKIE_MAX_AGE_SECS), 3600);
    }

    #[test]
    fn test_decode_non_string_identity_claims() {
        let token = test_token(&json!({"name": 123, "email": "a@b.com", "exp": NOW + 3600}));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.name.as_deref(), Some("123"));
        assert_eq!(claims.email.as_deref(), Some("a@b.com"));
        assert_eq!(claims.exp, Some((NOW + 3600) as f64));

        let token = test_token(&json!({"name": {"first": "A"}, "email": null, "exp": "soon"}));
        assert_eq!(decode(&token).unwrap(), Claims::default());
        assert!(!is_expired_at(&token, NOW));
    }

    #[test]
    fn test_decode_ignores_unknown_claims() {
        let token = test_token(&json!({"sub": "42", "roles": ["admin"], "email": "x@y.z"}));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.email.as_deref(), Some("x@y.z"));
        assert_eq!(claims.name, None);
        assert_eq!(claims.exp, None);
    }

    #[test]
    fn test_decode_non_ascii_payload() {
        let token = test_token(&json!({"name": "Zoë Ångström 旅"}));
        assert_eq!(decode(&token).unwrap().name.as_deref(), Some("Zoë Ångström 旅"));
    }

    #[test]
    fn test_decode_accepts_padding() {
        // {"name":"A"} encodes to 16 chars without padding, use one that needs it
        let payload = base64::engine::general_purpose::URL_SAFE.encode(br#"{"name":"AB"}"#);
        assert!(payload.ends_with('='));
        let token = format!("h.{}.s", payload);
        assert_eq!(decode(&token).unwrap().name.as_deref(), Some("AB"));
    }

    #[test]
    fn test_decode_segment_count() {
        assert_eq!(decode(""), Err(TokenError::SegmentCount(1)));
        assert_eq!(decode("abc"), Err(TokenError::SegmentCount(1)));
        assert_eq!(decode("a.b"), Err(TokenError::SegmentCount(2)));
        assert_eq!(decode("a.b.c.d"), Err(TokenError::SegmentCount(4)));
    }

    #[test]
    fn test_decode_bad_payloads() {
        assert!(matches!(decode("h.!!!.s"), Err(TokenError::Base64(_))));

        let not_utf8 = PAYLOAD_ENGINE.encode([0xff, 0xfe, 0xfd]);
        assert_eq!(decode(&format!("h.{}.s", not_utf8)), Err(TokenError::Utf8));

        let not_json = PAYLOAD_ENGINE.encode("hello");
        assert!(matches!(decode(&format!("h.{}.s", not_json)), Err(TokenError::Json(_))));

        let not_object = PAYLOAD_ENGINE.encode("[1,2]");
        assert!(matches!(decode(&format!("h.{}.s", not_object)), Err(TokenError::Json(_))));
    }

    #[test]
    fn test_decode_too_large() {
        let token = format!("h.{}.s", "A".repeat(MAX_TOKEN_BYTES));
        assert_eq!(decode(&token), Err(TokenError::TooLarge));
    }

    #[test]
    fn test_is_expired_at() {
        let future = test_token(&json!({"exp": NOW + 100}));
        let past = test_token(&json!({"exp": NOW - 100}));
        let boundary = test_token(&json!({"exp": NOW}));
        let forever = test_token(&json!({"name": "A"}));

        assert!(!is_expired_at(&future, NOW));
        assert!(is_expired_at(&past, NOW));
        assert!(is_expired_at(&boundary, NOW));
        assert!(!is_expired_at(&forever, NOW));
        assert!(!is_expired_at(&forever, i64::MAX));
    }

    #[test]
    fn test_malformed_token_has_no_expiry() {
        assert_eq!(expiration_of("garbage"), None);
        assert!(!is_expired_at("garbage", NOW));
    }

    #[test]
    fn test_is_expired_uses_clock() {
        let now = Utc::now().timestamp();
        assert!(!is_expired(&test_token(&json!({"exp": now + 100}))));
        assert!(is_expired(&test_token(&json!({"exp": now - 100}))));
    }

    #[test]
    fn test_cookie_max_age_at() {
        let future = test_token(&json!({"exp": NOW + 3600}));
        let past = test_token(&json!({"exp": NOW - 3600}));
        let forever = test_token(&json!({}));

        assert_eq!(cookie_max_age_at(&future, NOW, DEFAULT_COOKIE_MAX_AGE_SECS), 3600);
        assert_eq!(cookie_max_age_at(&past, NOW, DEFAULT_COOKIE_MAX_AGE_SECS), 0);
        assert_eq!(cookie_max_age_at(&forever, NOW, DEFAULT_COOKIE_MAX_AGE_SECS), 604_800);
    }

    #[test]
    fn test_claims_user_projection() {
        let claims = Claims {
            name: None,
            email: Some("a@b.com".to_string()),
            exp: Some(NOW as f64),
        };
        assert_eq!(
            claims.user(),
            User {
                name: None,
                email: Some("a@b.com".to_string())
            }
        );
    }
}
