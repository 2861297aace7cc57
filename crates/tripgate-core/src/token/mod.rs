//! Token codec for the session bearer credential.
//!
//! This module provides:
//! - `decode`: Extracts the claims from a `header.payload.signature` token
//! - `expiration_of` / `is_expired`: Expiry derived from the `exp` claim
//!
//! Signatures are never verified here. The claims are trusted as issued,
//! and a token without `exp` never expires.

pub mod codec;

pub use codec::{
    cookie_max_age, cookie_max_age_at, decode, expiration_of, is_expired, is_expired_at, Claims,
    TokenError, User, DEFAULT_COOKIE_MAX_AGE_SECS,
};

#[cfg(test)]
pub(crate) use codec::test_token;
